use std::time::Instant;

#[derive(Clone, Debug)]
pub(crate) struct RunTime {
    start: Instant,
    end: Instant,
}

impl RunTime {
    pub(crate) fn since_start(start: Instant) -> Self {
        Self { start, end: Instant::now() }
    }
}

impl serde::Serialize for RunTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let duration = self.end - self.start;
        serializer.serialize_str(&format!("{}.{:03}s", duration.as_secs(), duration.subsec_millis()))
    }
}

/// Per phase run times. Phases an action skips stay empty.
#[derive(serde::Serialize, Clone, Debug, Default)]
pub(crate) struct RunTimes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) load: Option<RunTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) validate: Option<RunTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) generate: Option<RunTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) write: Option<RunTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) prism: Option<RunTime>,
    pub(crate) total: Option<RunTime>,
}

/// Run `f` and record how long it took in `slot`
pub(crate) fn timed<T>(slot: &mut Option<RunTime>, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let result = f();
    *slot = Some(RunTime::since_start(start));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_run_time_serialization() {
        let start = Instant::now();
        let run_time = RunTime {
            start,
            end: start + Duration::from_millis(2_045),
        };

        assert_eq!(serde_json::to_value(&run_time).unwrap(), "2.045s");
    }

    #[test]
    fn test_timed() {
        let mut run_times = RunTimes::default();

        assert_eq!(timed(&mut run_times.validate, || 7), 7);
        assert!(run_times.validate.is_some());

        let value = serde_json::to_value(&run_times).unwrap();
        assert!(value.get("validate").is_some());
        assert!(value.get("load").is_none());
        assert_eq!(value["total"], serde_json::Value::Null);
    }
}
