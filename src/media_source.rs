use serde::{Deserialize, Serialize};

/// Application-level classification of a producer's origin, carried in
/// `appData.source` on the wire (§9's Design Notes: replaces the source's
/// dynamically-typed `appData` with a closed sum type; unknown variants are
/// rejected at the protocol boundary by `serde`'s derive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaSource {
    Camera,
    Screen,
}

impl MediaSource {
    pub fn is_screen(self) -> bool {
        matches!(self, MediaSource::Screen)
    }
}

/// Strongly-typed producer application data, replacing the source's
/// `any`-typed `appData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    pub source: MediaSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_round_trips_through_json() {
        let data = AppData {
            source: MediaSource::Screen,
        };
        let json = serde_json::to_string(&data).unwrap();
        assert_eq!(json, r#"{"source":"screen"}"#);
        let back: AppData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn unknown_source_variant_is_rejected() {
        let err = serde_json::from_str::<AppData>(r#"{"source":"microphone"}"#);
        assert!(err.is_err());
    }
}
