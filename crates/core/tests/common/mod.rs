/// Minimal JPEG carrying only an EXIF DateTimeOriginal tag.
pub fn jpeg_with_date(date: &str) -> Vec<u8> {
    let mut tiff = b"MM\x00\x2a\x00\x00\x00\x08".to_vec();
    tiff.extend_from_slice(&[0x00, 0x01, 0x87, 0x69, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01]);
    tiff.extend_from_slice(&[0x00, 0x00, 0x00, 0x1a, 0x00, 0x00, 0x00, 0x00]);
    tiff.extend_from_slice(&[0x00, 0x01, 0x90, 0x03, 0x00, 0x02, 0x00, 0x00, 0x00, 0x14]);
    tiff.extend_from_slice(&[0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00]);
    tiff.extend_from_slice(date.as_bytes());
    tiff.push(0);

    let mut app1 = b"Exif\x00\x00".to_vec();
    app1.extend_from_slice(&tiff);
    let len = (app1.len() + 2) as u16;

    let mut jpeg = vec![0xff, 0xd8, 0xff, 0xe1];
    jpeg.extend_from_slice(&len.to_be_bytes());
    jpeg.extend_from_slice(&app1);
    jpeg.extend_from_slice(&[0xff, 0xd9]);
    jpeg
}
