use crate::error::AppError;
use crate::metadata::PhotoMetadata;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// Filter criteria as written in a collection file. Every key is optional;
/// a missing key places no constraint on that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
    #[serde(default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Keys the matcher does not know about; kept so a save does not drop them.
    #[serde(default, flatten)]
    pub extra: serde_yaml::Mapping,
}

/// Hand-edited YAML often has `rating: 5` or `date: 2025`; read any scalar as text.
fn scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_yaml::Value;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected a scalar filter value, found {:?}",
            other
        ))),
    }
}

impl FilterSpec {
    /// No recognised key present.
    pub fn is_empty(&self) -> bool {
        self.keywords.is_none() && self.location.is_none() && self.rating.is_none() && self.date.is_none()
    }

    /// Validates the spec. A rating that is not `N` or `N+` is rejected here,
    /// never inside the predicate.
    pub fn compile(&self) -> Result<Filter, AppError> {
        let rating = self.rating.as_deref().map(RatingFilter::parse).transpose()?;
        Ok(Filter {
            empty: self.is_empty(),
            keywords: self.keywords.as_deref().map(|k| {
                k.split(',')
                    .map(|term| term.trim().to_lowercase())
                    .filter(|term| !term.is_empty())
                    .collect()
            }),
            location: self.location.as_ref().map(|l| l.to_lowercase()),
            rating,
            date: self.date.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingFilter {
    Exactly(i32),
    AtLeast(i32),
}

impl RatingFilter {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let raw = raw.trim();
        let (digits, at_least) = match raw.strip_suffix('+') {
            Some(digits) => (digits.trim(), true),
            None => (raw, false),
        };
        let value: i32 = digits
            .parse()
            .map_err(|_| AppError::InvalidFilter(format!("rating must be N or N+, got {:?}", raw)))?;
        Ok(if at_least {
            RatingFilter::AtLeast(value)
        } else {
            RatingFilter::Exactly(value)
        })
    }

    fn accepts(self, rating: i32) -> bool {
        match self {
            RatingFilter::Exactly(n) => rating == n,
            RatingFilter::AtLeast(n) => rating >= n,
        }
    }
}

/// A validated [`FilterSpec`]; every present criterion must hold.
#[derive(Debug, Clone)]
pub struct Filter {
    empty: bool,
    keywords: Option<Vec<String>>,
    location: Option<String>,
    rating: Option<RatingFilter>,
    date: Option<String>,
}

impl Filter {
    pub fn matches(&self, metadata: &PhotoMetadata) -> bool {
        // Unfiltered collections are curated by hand, never computed.
        if self.empty {
            return false;
        }

        if let Some(terms) = &self.keywords {
            if !terms.iter().any(|term| metadata.keywords.contains(term)) {
                return false;
            }
        }

        if let Some(wanted) = &self.location {
            let Some(location) = &metadata.location else {
                return false;
            };
            if !location.fields().any(|field| field.to_lowercase() == *wanted) {
                return false;
            }
        }

        if let Some(rating_filter) = self.rating {
            match metadata.rating {
                Some(rating) if rating != 0 && rating_filter.accepts(rating) => {}
                _ => return false,
            }
        }

        if let Some(prefix) = &self.date {
            match &metadata.date {
                Some(date) if date.starts_with(prefix.as_str()) => {}
                _ => return false,
            }
        }

        true
    }
}

/// Compiles `spec` and applies it to `metadata`.
pub fn matches(metadata: &PhotoMetadata, spec: &FilterSpec) -> Result<bool, AppError> {
    Ok(spec.compile()?.matches(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Location;

    fn photo(keywords: &[&str]) -> PhotoMetadata {
        PhotoMetadata {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }

    fn rated(rating: Option<i32>) -> PhotoMetadata {
        PhotoMetadata { rating, ..Default::default() }
    }

    fn spec() -> FilterSpec {
        FilterSpec::default()
    }

    #[test]
    fn empty_spec_matches_nothing() {
        let everything = PhotoMetadata {
            keywords: ["street".to_string()].into_iter().collect(),
            rating: Some(5),
            date: Some("2025:01:01 00:00:00".into()),
            ..Default::default()
        };
        assert!(!matches(&everything, &spec()).unwrap());
        assert!(!matches(&PhotoMetadata::default(), &spec()).unwrap());
    }

    #[test]
    fn keywords_match_on_any_term() {
        let metadata = photo(&["street", "dusk"]);
        let filter = |k: &str| FilterSpec { keywords: Some(k.into()), ..spec() };

        assert!(matches(&metadata, &filter("urban, street")).unwrap());
        assert!(matches(&metadata, &filter(" DUSK ")).unwrap());
        assert!(!matches(&metadata, &filter("urban, night")).unwrap());
        assert!(!matches(&photo(&[]), &filter("street")).unwrap());
        assert!(!matches(&metadata, &filter("")).unwrap());
    }

    #[test]
    fn location_is_exact_and_case_insensitive() {
        let metadata = PhotoMetadata {
            location: Some(Location {
                sublocation: Some("Pike Place".into()),
                city: Some("Seattle".into()),
                state: Some("Washington".into()),
                country: Some("United States".into()),
            }),
            ..Default::default()
        };
        let filter = |l: &str| FilterSpec { location: Some(l.into()), ..spec() };

        for hit in ["seattle", "WASHINGTON", "pike place", "United States"] {
            assert!(matches(&metadata, &filter(hit)).unwrap(), "{hit}");
        }
        assert!(!matches(&metadata, &filter("seat")).unwrap());
        assert!(!matches(&PhotoMetadata::default(), &filter("seattle")).unwrap());
    }

    #[test]
    fn rating_threshold_and_exact() {
        let at_least = |n: i32| FilterSpec { rating: Some(format!("{n}+")), ..spec() };
        let exactly = FilterSpec { rating: Some("4".into()), ..spec() };

        assert!(matches(&rated(Some(4)), &exactly).unwrap());
        assert!(!matches(&rated(Some(5)), &exactly).unwrap());

        for n in 1..=4 {
            assert!(matches(&rated(Some(4)), &at_least(n)).unwrap());
        }
        assert!(!matches(&rated(Some(4)), &at_least(5)).unwrap());

        assert!(!matches(&rated(None), &at_least(1)).unwrap());
        assert!(!matches(&rated(Some(0)), &at_least(0)).unwrap());
    }

    #[test]
    fn non_numeric_rating_is_rejected_at_compile() {
        let bad = FilterSpec { rating: Some("high".into()), ..spec() };
        assert!(matches!(bad.compile(), Err(AppError::InvalidFilter(_))));
        assert!(matches!(RatingFilter::parse("+"), Err(AppError::InvalidFilter(_))));
        assert_eq!(RatingFilter::parse(" 3+ ").unwrap(), RatingFilter::AtLeast(3));
    }

    #[test]
    fn date_is_a_plain_prefix() {
        let filter = FilterSpec { date: Some("2025".into()), ..spec() };
        let dated = |d: &str| PhotoMetadata { date: Some(d.into()), ..Default::default() };

        assert!(matches(&dated("2025:06:01 10:00:00"), &filter).unwrap());
        assert!(matches(&dated("2025:champion"), &filter).unwrap());
        assert!(!matches(&dated("2024:12:31 23:59:59"), &filter).unwrap());
        assert!(!matches(&PhotoMetadata::default(), &filter).unwrap());
    }

    #[test]
    fn criteria_are_conjunctive() {
        let filter = FilterSpec {
            keywords: Some("street".into()),
            rating: Some("4+".into()),
            ..spec()
        };
        let mut metadata = photo(&["street"]);
        metadata.rating = Some(3);
        assert!(!matches(&metadata, &filter).unwrap());
        metadata.rating = Some(4);
        assert!(matches(&metadata, &filter).unwrap());
    }

    #[test]
    fn yaml_scalars_are_read_as_text() {
        let spec: FilterSpec = serde_yaml::from_str("rating: 5\ndate: 2025\nkeywords: street\n").unwrap();
        assert_eq!(spec.rating.as_deref(), Some("5"));
        assert_eq!(spec.date.as_deref(), Some("2025"));
        assert_eq!(spec.keywords.as_deref(), Some("street"));
        assert_eq!(spec.location, None);

        let empty: FilterSpec = serde_yaml::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }
}
