//! In-memory images and archives for tests.
//!
//! Everything here panics on failure; it is only meant for test code.

use std::io::{Cursor, Write};

use image::{ImageFormat, Rgb, RgbImage};

fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 128])
    });

    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, format)
        .expect("fixture image should encode");
    buffer.into_inner()
}

/// A valid PNG of the given size.
pub fn png(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Png)
}

/// A valid JPEG of the given size.
pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    encode(width, height, ImageFormat::Jpeg)
}

/// A PNG with an intact header and a truncated pixel stream.
pub fn corrupt_png() -> Vec<u8> {
    let mut bytes = png(64, 64);
    bytes.truncate(bytes.len() * 3 / 5);
    bytes
}

/// A deflate-compressed zip holding `files` in order.
pub fn zip_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));

    for (name, data) in files {
        writer
            .start_file(*name, options)
            .expect("fixture zip entry should start");
        writer
            .write_all(data)
            .expect("fixture zip entry should write");
    }

    writer
        .finish()
        .expect("fixture zip should finish")
        .into_inner()
}

/// An uncompressed tar holding `files` in order.
pub fn tar_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());

    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder
            .append_data(&mut header, *name, *data)
            .expect("fixture tar entry should append");
    }

    builder.into_inner().expect("fixture tar should finish")
}

/// A tar with one entry whose raw header name is `name`, unchecked.
pub fn tar_with_raw_name(name: &str, data: &[u8]) -> Vec<u8> {
    let mut header = tar::Header::new_gnu();
    {
        let gnu = header.as_gnu_mut().expect("gnu header");
        gnu.name[..name.len()].copy_from_slice(name.as_bytes());
    }
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append(&header, data)
        .expect("fixture tar entry should append");
    builder.into_inner().expect("fixture tar should finish")
}

/// A gzip-compressed tar.
pub fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(&tar_archive(files))
        .expect("fixture gzip should write");
    encoder.finish().expect("fixture gzip should finish")
}

/// A bzip2-compressed tar.
pub fn tar_bz2(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder
        .write_all(&tar_archive(files))
        .expect("fixture bzip2 should write");
    encoder.finish().expect("fixture bzip2 should finish")
}
