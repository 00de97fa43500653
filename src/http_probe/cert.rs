use chrono::{DateTime, Utc};
use x509_parser::parse_x509_certificate;

const SECONDS_PER_DAY: i64 = 86_400;

/// Whole days until the first non-CA certificate of `chain` expires, rounded
/// down. Certificates that fail to parse are skipped.
pub fn leaf_validity_days<'a, I>(chain: I, now: DateTime<Utc>) -> Option<i64>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    for der in chain {
        let parsed = match parse_x509_certificate(der) {
            Ok((_, parsed)) => parsed,
            Err(e) => {
                tracing::debug!("skipping unparsable peer certificate: {e}");
                continue;
            }
        };

        if parsed.is_ca() {
            continue;
        }

        let not_after = parsed.validity().not_after.timestamp();
        return Some((not_after - now.timestamp()).div_euclid(SECONDS_PER_DAY));
    }
    None
}
