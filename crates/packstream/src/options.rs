//! Per-stream configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::decoder::Decoder;
use crate::error::Result;
use crate::ext::ExtRegistry;
use crate::value::Value;

/// Replaces the default construction of dynamic maps.
///
/// Called with the decoder positioned at the map's framing byte.
pub type MapDecoderFn = fn(&mut Decoder<'_>) -> Result<Value>;

/// Encoder knobs. The boolean fields can be loaded from a config file.
///
/// ```
/// use packstream::EncoderOptions;
///
/// let opts = EncoderOptions::default()
///     .sort_map_keys(true)
///     .use_interned_strings(true);
/// assert!(opts.sort_map_keys && opts.use_interned_strings);
/// ```
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderOptions {
    /// Emit string-keyed maps in byte-lexicographic key order.
    pub sort_map_keys: bool,
    /// Treat every record field as `omitempty`.
    pub omit_empty_default: bool,
    /// Intern every string of 3 bytes or more.
    pub use_interned_strings: bool,
    /// Overrides [`ExtRegistry::global`] for this stream.
    #[serde(skip)]
    pub registry: Option<Arc<ExtRegistry>>,
}

impl EncoderOptions {
    pub fn sort_map_keys(mut self, on: bool) -> Self {
        self.sort_map_keys = on;
        self
    }

    pub fn omit_empty_default(mut self, on: bool) -> Self {
        self.omit_empty_default = on;
        self
    }

    pub fn use_interned_strings(mut self, on: bool) -> Self {
        self.use_interned_strings = on;
        self
    }

    pub fn registry(mut self, registry: Arc<ExtRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }
}

impl fmt::Debug for EncoderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncoderOptions")
            .field("sort_map_keys", &self.sort_map_keys)
            .field("omit_empty_default", &self.omit_empty_default)
            .field("use_interned_strings", &self.use_interned_strings)
            .field("registry", &self.registry.is_some())
            .finish()
    }
}

/// Container nesting allowed by [`DecoderOptions::default`].
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Decoder knobs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderOptions {
    /// Fail when a record lacks any field not tagged `omitempty`.
    pub strict_mode: bool,
    /// Add every plain string of 3 bytes or more to the dictionary.
    pub use_interned_strings: bool,
    /// Arrays, maps and records open at once before decoding fails with
    /// [`Error::DepthLimitExceeded`](crate::Error::DepthLimitExceeded).
    pub max_depth: usize,
    #[serde(skip)]
    pub custom_map_decoder: Option<MapDecoderFn>,
    #[serde(skip)]
    pub registry: Option<Arc<ExtRegistry>>,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            strict_mode: false,
            use_interned_strings: false,
            max_depth: DEFAULT_MAX_DEPTH,
            custom_map_decoder: None,
            registry: None,
        }
    }
}

impl DecoderOptions {
    pub fn strict_mode(mut self, on: bool) -> Self {
        self.strict_mode = on;
        self
    }

    pub fn use_interned_strings(mut self, on: bool) -> Self {
        self.use_interned_strings = on;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn custom_map_decoder(mut self, hook: MapDecoderFn) -> Self {
        self.custom_map_decoder = Some(hook);
        self
    }

    pub fn registry(mut self, registry: Arc<ExtRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }
}

impl fmt::Debug for DecoderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderOptions")
            .field("strict_mode", &self.strict_mode)
            .field("use_interned_strings", &self.use_interned_strings)
            .field("max_depth", &self.max_depth)
            .field("custom_map_decoder", &self.custom_map_decoder.is_some())
            .field("registry", &self.registry.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_off() {
        let enc = EncoderOptions::default();
        assert!(!enc.sort_map_keys && !enc.omit_empty_default && !enc.use_interned_strings);
        let dec = DecoderOptions::default();
        assert!(!dec.strict_mode && dec.custom_map_decoder.is_none());
    }

    #[test]
    fn load_from_toml() {
        let enc: EncoderOptions = toml::from_str("sort_map_keys = true").unwrap();
        assert!(enc.sort_map_keys);
        assert!(!enc.use_interned_strings);
        let dec: DecoderOptions =
            toml::from_str("strict_mode = true\nuse_interned_strings = true").unwrap();
        assert!(dec.strict_mode && dec.use_interned_strings);
        assert_eq!(dec.max_depth, DEFAULT_MAX_DEPTH);
        let dec: DecoderOptions = toml::from_str("max_depth = 8").unwrap();
        assert_eq!(dec.max_depth, 8);
    }

    #[test]
    fn round_trips_through_json() {
        let opts = EncoderOptions::default().omit_empty_default(true);
        let json = serde_json::to_string(&opts).unwrap();
        let back: EncoderOptions = serde_json::from_str(&json).unwrap();
        assert!(back.omit_empty_default);
    }
}
