use crate::error::{ShardisError, ShardisResult};

/// One end of a score interval, as written in ZRANGEBYSCORE and friends:
/// `1.5` is inclusive, `(1.5` exclusive, and `-inf`/`+inf` are unbounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBorder {
    pub value: f64,
    pub exclusive: bool,
}

impl ScoreBorder {
    pub const NEG_INF: ScoreBorder = ScoreBorder {
        value: f64::NEG_INFINITY,
        exclusive: false,
    };

    pub const POS_INF: ScoreBorder = ScoreBorder {
        value: f64::INFINITY,
        exclusive: false,
    };

    pub fn parse(raw: &[u8]) -> ShardisResult<Self> {
        let text = std::str::from_utf8(raw).map_err(|_| ShardisError::InvalidBorder)?;
        let (exclusive, number) = match text.strip_prefix('(') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let value: f64 = number.parse().map_err(|_| ShardisError::InvalidBorder)?;
        if value.is_nan() {
            return Err(ShardisError::InvalidBorder);
        }
        Ok(ScoreBorder { value, exclusive })
    }

    /// Used as a maximum: does `score` fall at or under this border?
    pub fn greater(&self, score: f64) -> bool {
        if self.exclusive {
            score < self.value
        } else {
            score <= self.value
        }
    }

    /// Used as a minimum: does `score` fall at or above this border?
    pub fn less(&self, score: f64) -> bool {
        if self.exclusive {
            score > self.value
        } else {
            score >= self.value
        }
    }

    /// True when no score can satisfy both borders.
    pub fn is_empty_interval(min: &ScoreBorder, max: &ScoreBorder) -> bool {
        min.value > max.value || (min.value == max.value && (min.exclusive || max.exclusive))
    }
}
