use std::fmt;
use std::time::Duration;

/// Sentinel for a status code or certificate validity that was never obtained.
pub const NOT_OBTAINED: i64 = -1;

/// Outcome of one probe attempt sequence against a single URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub url: String,
    pub reachable: bool,
    pub status_code: i64,
    pub cert_validity_days: i64,
    pub response_latency: Duration,
}

impl ProbeResult {
    /// A probe that never received an HTTP response.
    pub fn unreachable(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reachable: false,
            status_code: NOT_OBTAINED,
            cert_validity_days: NOT_OBTAINED,
            response_latency: Duration::ZERO,
        }
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.reachable { "Up" } else { "Down" };
        write!(
            f,
            "[{status}] {} {{Status:{} CertValidityDays:{} RespondTime: {}ms}}",
            self.url,
            self.status_code,
            self.cert_validity_days,
            self.response_latency.as_millis()
        )
    }
}

/// All probe results of one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedReport {
    results: Vec<ProbeResult>,
}

impl AggregatedReport {
    pub fn new(results: Vec<ProbeResult>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[ProbeResult] {
        &self.results
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn all_up(&self) -> bool {
        self.results.iter().all(|result| result.reachable)
    }

    /// One summary line per endpoint, newline terminated.
    pub fn summary(&self) -> String {
        self.results
            .iter()
            .map(|result| format!("{result}\n"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_line() {
        let result = ProbeResult {
            url: "https://www.example.com".to_string(),
            reachable: true,
            status_code: 200,
            cert_validity_days: 42,
            response_latency: Duration::from_micros(12_700),
        };
        assert_eq!(
            result.to_string(),
            "[Up] https://www.example.com {Status:200 CertValidityDays:42 RespondTime: 12ms}"
        );
    }

    #[test]
    fn test_unreachable_uses_sentinels() {
        let result = ProbeResult::unreachable("http://nowhere.invalid");
        assert!(!result.reachable);
        assert_eq!(result.status_code, NOT_OBTAINED);
        assert_eq!(result.cert_validity_days, NOT_OBTAINED);
        assert_eq!(
            result.to_string(),
            "[Down] http://nowhere.invalid {Status:-1 CertValidityDays:-1 RespondTime: 0ms}"
        );
    }

    #[test]
    fn test_report_is_down_when_any_endpoint_is_down() {
        let mut up = ProbeResult::unreachable("https://a.com");
        up.reachable = true;
        up.status_code = 200;

        let report = AggregatedReport::new(vec![up.clone(), ProbeResult::unreachable("https://b.com")]);
        assert!(!report.all_up());
        assert_eq!(report.summary().lines().count(), 2);

        assert!(AggregatedReport::new(vec![up]).all_up());
    }
}
