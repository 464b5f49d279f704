use chrono::TimeDelta;

quantity!(Hours, via: f64, suffix: "h", precision: 1);

impl Hours {
    pub const fn from_seconds(seconds: f64) -> Self {
        Self(seconds / 3600.0)
    }
}

impl From<TimeDelta> for Hours {
    fn from(time_delta: TimeDelta) -> Self {
        Self::from_seconds(time_delta.as_seconds_f64())
    }
}
