use serde::{Deserialize, Serialize};
use std::fmt;

/// A single weather observation as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherResult {
    pub temperature: i32,
    pub humidity: i32,
    pub icon: String,
    pub city_name: String,
}

impl WeatherResult {
    pub fn new(
        temperature: i32,
        humidity: i32,
        icon: impl Into<String>,
        city_name: impl Into<String>,
    ) -> Self {
        Self {
            temperature,
            humidity,
            icon: icon.into(),
            city_name: city_name.into(),
        }
    }

    /// Placeholder used when neither a fresh nor a cached result is available.
    pub fn empty() -> Self {
        Self::new(-1000, 0, UNKNOWN_ICON, "Unknown")
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }
}

const UNKNOWN_ICON: &str = "?";

/// Map a provider condition code (`01d`, `10n`, ...) to a display glyph.
pub fn icon_glyph(code: &str) -> &'static str {
    match code {
        "01d" => "☀",
        "01n" => "🌙",
        _ => match code.get(..2) {
            Some("02") => "⛅",
            Some("03") | Some("04") => "☁",
            Some("09") => "🌧",
            Some("10") => "🌦",
            Some("11") => "⛈",
            Some("13") => "❄",
            Some("50") => "🌫",
            _ => UNKNOWN_ICON,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4},{:.4}", self.lat, self.lon)
    }
}

/// A location reading together with its horizontal accuracy in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    pub coordinates: Coordinates,
    pub horizontal_accuracy: f64,
}

impl LocationFix {
    pub fn new(lat: f64, lon: f64, horizontal_accuracy: f64) -> Self {
        Self {
            coordinates: Coordinates { lat, lon },
            horizontal_accuracy,
        }
    }
}

/// Cache key for text queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for QueryKey {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One outbound weather request and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryRequest {
    Text { city: String },
    Geo { coordinates: Coordinates },
}

impl QueryRequest {
    /// Build a text request, rejecting empty or whitespace-only input.
    pub fn text(raw: &str) -> Option<Self> {
        let city = raw.trim();
        if city.is_empty() {
            return None;
        }
        Some(Self::Text {
            city: city.to_owned(),
        })
    }

    pub fn geo(coordinates: Coordinates) -> Self {
        Self::Geo { coordinates }
    }

    /// Geo requests have no stable key and are never cached.
    pub fn cache_key(&self) -> Option<QueryKey> {
        match self {
            QueryRequest::Text { city } => Some(QueryKey::from(city.as_str())),
            QueryRequest::Geo { .. } => None,
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            QueryRequest::Text { .. } => "text",
            QueryRequest::Geo { .. } => "geo",
        }
    }
}

impl fmt::Display for QueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryRequest::Text { city } => write!(f, "city '{city}'"),
            QueryRequest::Geo { coordinates } => write!(f, "location {coordinates}"),
        }
    }
}

/// Raw events coming from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Submit(String),
    LocateMe,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_request_rejects_blank_input() {
        assert_eq!(QueryRequest::text(""), None);
        assert_eq!(QueryRequest::text("   \t"), None);
    }

    #[test]
    fn text_request_trims_city() {
        let request = QueryRequest::text("  London ").expect("non-empty input");
        assert_eq!(
            request,
            QueryRequest::Text {
                city: "London".into(),
            }
        );
        assert_eq!(request.cache_key(), Some(QueryKey::from("London")));
    }

    #[test]
    fn geo_request_has_no_cache_key() {
        let request = QueryRequest::geo(Coordinates {
            lat: 51.5,
            lon: -0.12,
        });
        assert_eq!(request.cache_key(), None);
        assert_eq!(request.source(), "geo");
    }

    #[test]
    fn empty_result_is_recognised() {
        assert!(WeatherResult::empty().is_empty());
        assert!(!WeatherResult::new(18, 50, "☀", "London").is_empty());
    }

    #[test]
    fn icon_codes_map_to_glyphs() {
        assert_eq!(icon_glyph("01d"), "☀");
        assert_eq!(icon_glyph("01n"), "🌙");
        assert_eq!(icon_glyph("04n"), "☁");
        assert_eq!(icon_glyph("10d"), "🌦");
        assert_eq!(icon_glyph("zz"), "?");
        assert_eq!(icon_glyph(""), "?");
    }
}
