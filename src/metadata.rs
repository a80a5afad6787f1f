// src/metadata.rs

use crate::error::AppError;
use crate::exif_fields::{self, ExifFields};
use crate::xmp::{self, XmpFields, XmpLocation};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Serialize, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub sublocation: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl Location {
    /// True when at least one field is set.
    pub fn is_set(&self) -> bool {
        self.sublocation.is_some() || self.city.is_some() || self.state.is_some() || self.country.is_some()
    }

    /// Lowercased `state/city/sublocation` of whichever are present. Country
    /// is never part of the path.
    pub fn to_path_string(&self) -> Option<String> {
        let parts: Vec<String> = [&self.state, &self.city, &self.sublocation]
            .into_iter()
            .flatten()
            .map(|part| part.to_lowercase())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        [&self.sublocation, &self.city, &self.state, &self.country]
            .into_iter()
            .flatten()
            .map(String::as_str)
    }
}

impl From<XmpLocation> for Location {
    fn from(xmp: XmpLocation) -> Self {
        Self {
            sublocation: xmp.sublocation,
            city: xmp.city,
            state: xmp.state,
            country: xmp.country,
        }
    }
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct PhotoMetadata {
    pub keywords: BTreeSet<String>,
    pub location: Option<Location>,
    pub rating: Option<i32>,
    pub date: Option<String>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    pub focal_length: Option<f64>,
    pub aperture: Option<f64>,
    pub shutter_speed: Option<String>,
    pub iso: Option<u32>,
}

impl PhotoMetadata {
    fn from_parts(xmp: XmpFields, exif: ExifFields) -> Self {
        let location = Location::from(xmp.location);
        Self {
            keywords: xmp.keywords.iter().map(|k| k.to_lowercase()).collect(),
            location: location.is_set().then_some(location),
            rating: xmp.rating,
            date: exif.date,
            camera_make: exif.camera_make,
            camera_model: exif.camera_model,
            lens_model: exif.lens_model,
            focal_length: exif.focal_length,
            aperture: exif.aperture,
            shutter_speed: exif.shutter_speed,
            iso: exif.iso,
        }
    }
}

/// Reads a photo and extracts its metadata. Only a missing file is an error;
/// unreadable or malformed embedded metadata leaves fields absent.
pub fn extract(path: &Path) -> Result<PhotoMetadata, AppError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    log::trace!("Extracting metadata for {:?} ({} bytes)", path, bytes.len());
    Ok(extract_bytes(&bytes))
}

pub fn extract_bytes(bytes: &[u8]) -> PhotoMetadata {
    PhotoMetadata::from_parts(xmp::read(bytes), exif_fields::read(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif_fields::tests::{jpeg, sample_camera_jpeg, tiff, TestValue};
    use tempfile::TempDir;

    const PACKET: &str = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
<rdf:Description xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:photoshop="http://ns.adobe.com/photoshop/1.0/" xmlns:xmp="http://ns.adobe.com/xap/1.0/" photoshop:City="Seattle" photoshop:State="Washington" xmp:Rating="5">
<dc:subject><rdf:Bag><rdf:li>Street</rdf:li><rdf:li>DUSK</rdf:li></rdf:Bag></dc:subject>
</rdf:Description></rdf:RDF></x:xmpmeta>"#;

    #[test]
    fn location_path_string_order_and_case() {
        let location = Location {
            sublocation: Some("Pike Place".into()),
            city: Some("Seattle".into()),
            state: Some("Washington".into()),
            country: Some("USA".into()),
        };
        assert_eq!(location.to_path_string().as_deref(), Some("washington/seattle/pike place"));

        let city_only = Location { city: Some("Seattle".into()), ..Default::default() };
        assert_eq!(city_only.to_path_string().as_deref(), Some("seattle"));

        let country_only = Location { country: Some("USA".into()), ..Default::default() };
        assert!(country_only.is_set());
        assert_eq!(country_only.to_path_string(), None);
        assert!(!Location::default().is_set());
    }

    #[test]
    fn merges_xmp_and_exif() {
        let bytes = jpeg(
            Some(tiff(&[(0x0132, TestValue::Ascii("2025:10:18 22:33:24"))], &[])),
            Some(PACKET),
        );
        let metadata = extract_bytes(&bytes);

        assert_eq!(
            metadata.keywords.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["dusk", "street"]
        );
        assert_eq!(metadata.rating, Some(5));
        assert_eq!(metadata.date.as_deref(), Some("2025:10:18 22:33:24"));
        let location = metadata.location.unwrap();
        assert_eq!(location.city.as_deref(), Some("Seattle"));
        assert_eq!(location.state.as_deref(), Some("Washington"));
    }

    #[test]
    fn photo_without_xmp_has_no_location() {
        let metadata = extract_bytes(&sample_camera_jpeg());
        assert!(metadata.keywords.is_empty());
        assert_eq!(metadata.location, None);
        assert_eq!(metadata.rating, None);
        assert_eq!(metadata.iso, Some(400));
    }

    #[test]
    fn extract_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone.jpg");
        assert!(matches!(extract(&missing), Err(AppError::NotFound(_))));
    }

    #[test]
    fn extract_absorbs_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"\xff\xd8<x:xmpmeta><broken</x:xmpmeta>").unwrap();
        assert_eq!(extract(&path).unwrap(), PhotoMetadata::default());
    }
}
