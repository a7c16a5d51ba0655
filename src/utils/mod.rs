use crate::error::{DexError, Result};

pub fn remove_trailing_slash(url: &str) -> String {
    url.strip_suffix('/').unwrap_or(url).to_string()
}

/// `units * price` as a coin amount. Negative prices and overflow are errors.
pub fn order_value(units: u64, unit_price: i64) -> Result<u64> {
    let price = u64::try_from(unit_price).map_err(|_| DexError::InvalidPrice(unit_price))?;
    units
        .checked_mul(price)
        .ok_or_else(|| DexError::InvalidAmount(format!("{} * {} overflows", units, price)))
}

/// Sum of coin amounts, failing on overflow.
pub fn checked_total(amounts: &[u64]) -> Result<u64> {
    amounts.iter().try_fold(0u64, |acc, v| {
        acc.checked_add(*v)
            .ok_or_else(|| DexError::InvalidAmount(format!("sum of {:?} overflows", amounts)))
    })
}

/// Retry `f` up to `retries` more times with exponential backoff
/// (`base_delay_ms * 2^attempt`, capped at 30 s).
pub async fn retry<T, E, F, Fut>(mut retries: u32, base_delay_ms: u64, mut f: F) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Debug,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if retries == 0 => return Err(e),
            Err(e) => {
                let delay = (base_delay_ms * (1u64 << attempt.min(5))).min(30_000);
                tracing::warn!(attempt = attempt + 1, delay_ms = delay, error = ?e, "request failed, retrying");
                tokio::time::sleep(tokio::time::Duration::from_millis(delay)).await;
                retries -= 1;
                attempt += 1;
            }
        }
    }
}
