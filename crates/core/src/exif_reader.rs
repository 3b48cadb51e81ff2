use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use exif::{In, Reader, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
pub const TAG_DATE_TIME: u16 = 0x0132;
pub const TAG_DATE_TIME_DIGITIZED: u16 = 0x9004;

/// Lookup order for the capture timestamp.
pub const DATE_TAG_PRIORITY: [u16; 3] = [
    TAG_DATE_TIME_ORIGINAL,
    TAG_DATE_TIME,
    TAG_DATE_TIME_DIGITIZED,
];

pub const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

pub type TagMap = HashMap<u16, Vec<u8>>;

/// Reads the raw metadata tags embedded in an image.
pub trait TagReader: Send + Sync {
    fn read_tags(&self, path: &Path) -> Result<TagMap>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExifTagReader;

impl TagReader for ExifTagReader {
    fn read_tags(&self, path: &Path) -> Result<TagMap> {
        let file = File::open(path)
            .with_context(|| format!("could not open image: {}", path.display()))?;
        let mut buf = BufReader::new(file);
        let exif = match Reader::new().read_from_container(&mut buf) {
            Ok(exif) => exif,
            Err(exif::Error::NotFound(_)) => return Ok(TagMap::new()),
            Err(err) => {
                return Err(anyhow::Error::from(err)
                    .context(format!("could not decode image metadata: {}", path.display())))
            }
        };

        let mut tags = TagMap::new();
        for field in exif.fields().filter(|f| f.ifd_num == In::PRIMARY) {
            if let Some(raw) = raw_bytes(&field.value) {
                tags.entry(field.tag.number()).or_insert(raw);
            }
        }
        Ok(tags)
    }
}

fn raw_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Ascii(parts) => {
            let mut raw = parts.first().cloned().unwrap_or_default();
            raw.push(0);
            Some(raw)
        }
        Value::Byte(bytes) | Value::Undefined(bytes, _) => Some(bytes.clone()),
        _ => None,
    }
}

/// First date tag present in priority order.
pub fn find_date_tag(tags: &TagMap) -> Option<&[u8]> {
    DATE_TAG_PRIORITY
        .iter()
        .find_map(|id| tags.get(id).map(Vec::as_slice))
}

/// Text of a NUL-terminated tag value.
pub fn tag_text(raw: &[u8]) -> String {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).to_string()
}

/// Capture time as written by the camera, in its own local wall-clock time.
///
/// No zone is attached, so times that fall in a DST gap of the host zone
/// still parse.
pub fn parse_exif_date(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, EXIF_DATE_FORMAT).ok()
}
