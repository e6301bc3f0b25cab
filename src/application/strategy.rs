use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::domain::frame::Encoding;

/// How a strategy turns a frame into pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum RenderPath {
    /// `data:` URL assigned straight to an `<img>`.
    DataUrl,
    /// Blob object URL assigned to an `<img>`.
    ObjectUrl,
    /// Canvas transferred to a worker, with the main-thread canvas as fallback.
    Offscreen,
}

/// One of the compared transport/render combinations.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum Strategy {
    #[strum(serialize = "base64-direct")]
    #[serde(rename = "base64-direct")]
    Base64Direct,
    #[strum(serialize = "base64-objecturl")]
    #[serde(rename = "base64-objecturl")]
    Base64ObjectUrl,
    #[strum(serialize = "binary-objecturl")]
    #[serde(rename = "binary-objecturl")]
    BinaryObjectUrl,
    #[strum(serialize = "base64-offscreen")]
    #[serde(rename = "base64-offscreen")]
    Base64Offscreen,
    #[strum(serialize = "binary-offscreen")]
    #[serde(rename = "binary-offscreen")]
    BinaryOffscreen,
}

impl Strategy {
    pub fn all() -> Vec<Strategy> {
        Strategy::iter().collect()
    }

    /// Enabled when the page first loads.
    pub fn default_enabled() -> Vec<Strategy> {
        vec![Strategy::Base64Direct, Strategy::BinaryObjectUrl, Strategy::Base64Offscreen, Strategy::BinaryOffscreen]
    }

    pub fn id(self) -> &'static str {
        self.into()
    }

    pub fn label(self) -> &'static str {
        match self {
            Strategy::Base64Direct => "Base64 direct",
            Strategy::Base64ObjectUrl => "Base64 → ObjectURL",
            Strategy::BinaryObjectUrl => "Binary → ObjectURL",
            Strategy::Base64Offscreen => "Base64 → OffscreenCanvas",
            Strategy::BinaryOffscreen => "Binary → OffscreenCanvas",
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Strategy::Base64Direct => "#1890ff",
            Strategy::Base64ObjectUrl => "#722ed1",
            Strategy::BinaryObjectUrl => "#52c41a",
            Strategy::Base64Offscreen => "#fa8c16",
            Strategy::BinaryOffscreen => "#eb2f96",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Strategy::Base64Direct => "Base64 data URL assigned directly to an IMG element",
            Strategy::Base64ObjectUrl => "Base64 decoded into a Blob, shown through an object URL",
            Strategy::BinaryObjectUrl => "Binary frame wrapped in a Blob, shown through an object URL",
            Strategy::Base64Offscreen => "Base64 frame rendered by an OffscreenCanvas worker",
            Strategy::BinaryOffscreen => "Binary frame rendered by an OffscreenCanvas worker",
        }
    }

    pub fn encoding(self) -> Encoding {
        match self {
            Strategy::Base64Direct | Strategy::Base64ObjectUrl | Strategy::Base64Offscreen => Encoding::Base64,
            Strategy::BinaryObjectUrl | Strategy::BinaryOffscreen => Encoding::Binary,
        }
    }

    pub fn render_path(self) -> RenderPath {
        match self {
            Strategy::Base64Direct => RenderPath::DataUrl,
            Strategy::Base64ObjectUrl | Strategy::BinaryObjectUrl => RenderPath::ObjectUrl,
            Strategy::Base64Offscreen | Strategy::BinaryOffscreen => RenderPath::Offscreen,
        }
    }

    pub fn is_offscreen(self) -> bool {
        self.render_path() == RenderPath::Offscreen
    }
}

/// Whether any strategy in `enabled` consumes frames of `encoding`.
pub fn needs_encoding(enabled: &[Strategy], encoding: Encoding) -> bool {
    enabled.iter().any(|s| s.encoding() == encoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_strum() {
        for strategy in Strategy::iter() {
            assert_eq!(strategy.id().parse::<Strategy>(), Ok(strategy));
        }
        assert_eq!(Strategy::BinaryObjectUrl.id(), "binary-objecturl");
    }

    #[test]
    fn default_set_leaves_out_base64_object_url() {
        let enabled = Strategy::default_enabled();
        assert_eq!(enabled.len(), 4);
        assert!(!enabled.contains(&Strategy::Base64ObjectUrl));
        assert!(needs_encoding(&enabled, Encoding::Base64));
        assert!(needs_encoding(&enabled, Encoding::Binary));
    }

    #[test]
    fn binary_strategies_only_need_the_binary_source() {
        let enabled = [Strategy::BinaryObjectUrl, Strategy::BinaryOffscreen];
        assert!(!needs_encoding(&enabled, Encoding::Base64));
        assert!(needs_encoding(&enabled, Encoding::Binary));
        assert!(enabled.iter().all(|s| s.encoding() == Encoding::Binary));
    }
}
