use exif::{Context, Exif, Field, In, Reader, Tag, Value};
use std::io::Cursor;

/// Camera fields read from the EXIF block. Every field is optional; a photo
/// without a readable EXIF block yields the default (all absent).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifFields {
    pub date: Option<String>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    pub focal_length: Option<f64>,
    pub aperture: Option<f64>,
    pub shutter_speed: Option<String>,
    pub iso: Option<u32>,
}

fn parse_container(bytes: &[u8]) -> Option<Exif> {
    match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => Some(exif),
        Err(e) => {
            log::trace!("No readable EXIF block: {}", e);
            None
        }
    }
}

pub fn read(bytes: &[u8]) -> ExifFields {
    let Some(exif) = parse_container(bytes) else {
        return ExifFields::default();
    };

    let mut fields = ExifFields::default();
    let primary = || exif.fields().filter(|f| f.ifd_num == In::PRIMARY);
    // Main directory first, then the Exif sub-directory (0x8769).
    for field in primary().filter(|f| f.tag.context() == Context::Tiff) {
        fields.apply(field);
    }
    for field in primary().filter(|f| f.tag.context() == Context::Exif) {
        fields.apply(field);
    }
    fields
}

/// Every field in the EXIF block as `(tag, value)` display strings.
pub fn raw_fields(bytes: &[u8]) -> Vec<(String, String)> {
    let Some(exif) = parse_container(bytes) else {
        return Vec::new();
    };
    exif.fields()
        .map(|f| (f.tag.to_string(), f.display_value().with_unit(&exif).to_string()))
        .collect()
}

impl ExifFields {
    fn apply(&mut self, field: &Field) {
        match field.tag {
            Tag::DateTime | Tag::DateTimeOriginal => {
                if self.date.is_none() {
                    self.date = ascii(&field.value).map(|s| s.trim_end_matches('\0').to_string());
                }
            }
            Tag::Make => self.camera_make = ascii(&field.value).map(|s| s.trim().to_string()),
            Tag::Model => self.camera_model = ascii(&field.value).map(|s| s.trim().to_string()),
            Tag::LensModel => self.lens_model = ascii(&field.value).map(|s| s.trim().to_string()),
            Tag::FocalLength => self.focal_length = decimal(&field.value),
            Tag::FNumber => self.aperture = decimal(&field.value),
            Tag::ExposureTime => self.shutter_speed = exposure(&field.value),
            Tag::PhotographicSensitivity => self.iso = field.value.get_uint(0),
            _ => {}
        }
    }
}

fn ascii(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(parts) => parts.first().map(|p| String::from_utf8_lossy(p).into_owned()),
        _ => None,
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Numerator/denominator pair, if the value is stored as one.
fn ratio(value: &Value) -> Option<(f64, f64)> {
    match value {
        Value::Rational(v) => v.first().map(|r| (r.num as f64, r.denom as f64)),
        Value::SRational(v) => v.first().map(|r| (r.num as f64, r.denom as f64)),
        _ => None,
    }
}

fn plain_number(value: &Value) -> Option<f64> {
    match value {
        Value::Byte(v) => v.first().map(|n| *n as f64),
        Value::Short(v) => v.first().map(|n| *n as f64),
        Value::Long(v) => v.first().map(|n| *n as f64),
        Value::SByte(v) => v.first().map(|n| *n as f64),
        Value::SShort(v) => v.first().map(|n| *n as f64),
        Value::SLong(v) => v.first().map(|n| *n as f64),
        Value::Float(v) => v.first().map(|n| *n as f64),
        Value::Double(v) => v.first().copied(),
        Value::Ascii(_) => ascii(value).and_then(|s| s.trim().parse().ok()),
        _ => None,
    }
}

/// One decimal place; a zero denominator yields the numerator unchanged.
fn decimal(value: &Value) -> Option<f64> {
    match ratio(value) {
        Some((num, denom)) if denom == 0.0 => Some(num),
        Some((num, denom)) => Some(round1(num / denom)),
        None => plain_number(value).map(round1),
    }
}

fn exposure(value: &Value) -> Option<String> {
    if let Some((num, denom)) = ratio(value) {
        return Some(if num == 1.0 {
            format!("1/{}", denom)
        } else if denom == 0.0 {
            format!("{}", num)
        } else {
            format!("{:.2}", num / denom)
        });
    }
    plain_number(value).map(|seconds| {
        if seconds > 0.0 && seconds < 1.0 {
            format!("1/{}", (1.0 / seconds).round())
        } else {
            format!("{:.2}", seconds)
        }
    })
}
