use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const KEY_TOTAL_FRAMES: &str = "totalFrames";
const KEY_NEIGHBOR_RADIUS: &str = "neighboringWindowLimit";
const KEY_FRAME_SKIP: &str = "frameSkippingLimit";

// Older producers wrote these spellings.
const LEGACY_NEIGHBOR_RADIUS: &str = "neighbouringWindowLimit";
const LEGACY_FRAME_SKIP: &str = "frameSkipingLimit";

/// Selection policy for one writer instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowConfig {
    /// Lifetime cap on frames accepted by the encoder. 0 means unlimited.
    pub total_frame_budget: u64,
    /// Half-width of the window around the centre index.
    pub neighbor_radius: u64,
    /// Reserved for skip-based sampling; selection ignores it.
    pub frame_skip_limit: u64,
}

impl WindowConfig {
    pub fn new(total_frame_budget: u64, neighbor_radius: u64) -> Self {
        Self {
            total_frame_budget,
            neighbor_radius,
            frame_skip_limit: 0,
        }
    }

    pub fn with_frame_skip_limit(mut self, limit: u64) -> Self {
        self.frame_skip_limit = limit;
        self
    }

    pub fn is_budget_unlimited(&self) -> bool {
        self.total_frame_budget == 0
    }

    /// Builds a config from a loosely-typed key/value map.
    ///
    /// Numbers are truncated toward zero, numeric strings are parsed, and
    /// anything else (including negatives and a missing map) becomes 0.
    pub fn from_map(map: Option<&Map<String, Value>>) -> Self {
        let Some(map) = map else {
            return Self::default();
        };
        Self {
            total_frame_budget: coerce(map.get(KEY_TOTAL_FRAMES)),
            neighbor_radius: coerce(
                map.get(KEY_NEIGHBOR_RADIUS)
                    .or_else(|| map.get(LEGACY_NEIGHBOR_RADIUS)),
            ),
            frame_skip_limit: coerce(map.get(KEY_FRAME_SKIP).or_else(|| map.get(LEGACY_FRAME_SKIP))),
        }
    }

    /// Parses a JSON object; non-object documents coerce to the default config.
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_map(value.as_object()))
    }

    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(KEY_TOTAL_FRAMES.to_string(), self.total_frame_budget.into());
        map.insert(KEY_NEIGHBOR_RADIUS.to_string(), self.neighbor_radius.into());
        map.insert(KEY_FRAME_SKIP.to_string(), self.frame_skip_limit.into());
        map
    }
}

fn coerce(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.trunc() as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    }
}
