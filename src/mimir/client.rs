/// The subset of the Prometheus remote-write protobuf schema the bot sends.
pub mod prompb {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct WriteRequest {
        #[prost(message, repeated, tag = "1")]
        pub timeseries: Vec<TimeSeries>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct TimeSeries {
        #[prost(message, repeated, tag = "1")]
        pub labels: Vec<Label>,
        #[prost(message, repeated, tag = "2")]
        pub samples: Vec<Sample>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Label {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, tag = "2")]
        pub value: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Sample {
        #[prost(double, tag = "1")]
        pub value: f64,
        #[prost(int64, tag = "2")]
        pub timestamp: i64,
    }
}

use chrono::Utc;
use prompb::{Label, Sample, TimeSeries, WriteRequest};
use reqwest::{
    Client,
    header::{CONTENT_ENCODING, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use snap::raw::Encoder;

use crate::error::RemoteWriteError;

const PUSH_PATH: &str = "/api/v1/push";
const REMOTE_WRITE_VERSION: &str = "0.1.0";

/// Serializes `timeseries` into a snappy-compressed `WriteRequest`, the body
/// format of the remote-write protocol.
pub fn encode_write_request(timeseries: Vec<TimeSeries>) -> Result<Vec<u8>, RemoteWriteError> {
    let request = WriteRequest { timeseries };
    let mut raw = Vec::with_capacity(prost::Message::encoded_len(&request));
    prost::Message::encode(&request, &mut raw)?;
    Ok(Encoder::new().compress_vec(&raw)?)
}

fn push_headers(tenant_id: Option<&str>) -> Result<HeaderMap, RemoteWriteError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_ENCODING, HeaderValue::from_static("snappy"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/x-protobuf"));
    headers.insert(
        "X-Prometheus-Remote-Write-Version",
        HeaderValue::from_static(REMOTE_WRITE_VERSION),
    );
    if let Some(tenant_id) = tenant_id {
        headers.insert("X-Scope-OrgID", HeaderValue::from_str(tenant_id)?);
    }
    Ok(headers)
}

/// Pushes `series` to `<endpoint>/api/v1/push`. A non-2xx answer is returned
/// as `RemoteWriteError::Rejected` with the response body. Nothing is sent
/// when there are no series.
pub async fn push_series(
    client: &Client,
    endpoint: &str,
    tenant_id: Option<&str>,
    series: Vec<TimeSeries>,
) -> Result<(), RemoteWriteError> {
    if series.is_empty() {
        tracing::debug!("remote write skipped, no series");
        return Ok(());
    }

    let url = format!("{}{PUSH_PATH}", endpoint.trim_end_matches('/'));
    tracing::debug!("pushing {} series to {url}", series.len());

    let response = client
        .post(url)
        .headers(push_headers(tenant_id)?)
        .body(encode_write_request(series)?)
        .send()
        .await?;

    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteWriteError::Rejected { status, body })
}

/// Creates a `TimeSeries` with a single sample.
///
/// # Arguments
///     * `metric_name` - The name of the metric, stored as the `__name__` label.
///     * `labels` - Additional labels, e.g. `&[("url", "https://www.example.com")]`.
///     * `value` - The sample value.
///     * `timestamp_ms` - Optional timestamp in milliseconds, defaults to now.
pub fn create_time_series(
    metric_name: &str,
    labels: &[(&str, &str)],
    value: f64,
    timestamp_ms: Option<i64>,
) -> TimeSeries {
    let mut all_labels = Vec::with_capacity(labels.len() + 1);
    all_labels.push(Label {
        name: "__name__".to_string(),
        value: metric_name.to_string(),
    });

    for (name, val) in labels {
        all_labels.push(Label {
            name: name.to_string(),
            value: val.to_string(),
        });
    }

    let sample = Sample {
        value,
        timestamp: timestamp_ms.unwrap_or_else(|| Utc::now().timestamp_millis()),
    };

    TimeSeries {
        labels: all_labels,
        samples: vec![sample],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_create_time_series_prepends_name() {
        let series = create_time_series("up", &[("url", "https://a.com")], 1.0, Some(1_000));

        assert_eq!(series.labels[0].name, "__name__");
        assert_eq!(series.labels[0].value, "up");
        assert_eq!(series.labels[1].name, "url");
        assert_eq!(series.samples, vec![Sample { value: 1.0, timestamp: 1_000 }]);
    }

    #[tokio::test]
    async fn test_push_is_snappy_protobuf() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/push"))
            .and(header("content-encoding", "snappy"))
            .and(header("content-type", "application/x-protobuf"))
            .and(header("x-scope-orgid", "demo"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let series = vec![create_time_series("up", &[("url", "https://a.com")], 1.0, Some(42))];
        push_series(&Client::new(), &server.uri(), Some("demo"), series.clone())
            .await
            .expect("push");

        let received = server.received_requests().await.expect("recording enabled");
        let raw = snap::raw::Decoder::new()
            .decompress_vec(&received[0].body)
            .expect("snappy body");
        let decoded = WriteRequest::decode(raw.as_slice()).expect("protobuf body");
        assert_eq!(decoded.timeseries, series);
    }

    #[tokio::test]
    async fn test_rejected_push_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("out of order sample"))
            .mount(&server)
            .await;

        let series = vec![create_time_series("up", &[], 0.0, None)];
        let err = push_series(&Client::new(), &server.uri(), None, series)
            .await
            .expect_err("rejected");

        assert!(matches!(
            err,
            RemoteWriteError::Rejected { status, ref body } if status == 400 && body == "out of order sample"
        ));
    }

    #[tokio::test]
    async fn test_nothing_to_send_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        push_series(&Client::new(), &server.uri(), None, Vec::new())
            .await
            .expect("no-op");
    }

    #[test]
    fn test_encoded_request_decodes_back() {
        let series = vec![
            create_time_series("up", &[("url", "https://a.com")], 1.0, Some(7)),
            create_time_series("up", &[("url", "https://b.com")], 0.0, Some(7)),
        ];

        let body = encode_write_request(series.clone()).expect("encode");

        let raw = snap::raw::Decoder::new().decompress_vec(&body).expect("snappy");
        assert_eq!(WriteRequest::decode(raw.as_slice()).expect("protobuf").timeseries, series);
    }

    #[test]
    fn test_invalid_tenant_id_is_rejected_before_sending() {
        assert!(push_headers(Some("demo")).is_ok());
        assert!(push_headers(None).expect("headers").get("x-scope-orgid").is_none());
        assert!(matches!(
            push_headers(Some("bad\ntenant")),
            Err(RemoteWriteError::Header(_))
        ));
    }
}
