use std::fmt;

use serde::Serialize;

use super::config::PriceTable;

/// Rough vision-model cost of sending a set of images. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostEstimate {
    pub image_count: usize,
    pub estimated_tokens: u64,
    pub estimated_usd: f64,
    pub estimated_jpy: f64,
}

impl CostEstimate {
    /// One `(width, height)` per image as encoded, not as analysed.
    pub fn estimate<I>(dimensions: I, prices: &PriceTable) -> Self
    where
        I: IntoIterator<Item = (u32, u32)>,
    {
        let mut image_count = 0;
        let mut estimated_tokens = 0u64;
        for (w, h) in dimensions {
            image_count += 1;
            let pixels = w as f64 * h as f64;
            estimated_tokens += (pixels / prices.pixels_per_token).floor() as u64;
        }
        let estimated_usd = estimated_tokens as f64 / 1_000_000.0 * prices.usd_per_million_tokens;
        Self {
            image_count,
            estimated_tokens,
            estimated_usd,
            estimated_jpy: estimated_usd * prices.jpy_per_usd,
        }
    }
}

impl fmt::Display for CostEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} images, ~{} tokens, ~${:.4} (~¥{:.2})",
            self.image_count, self.estimated_tokens, self.estimated_usd, self.estimated_jpy
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate() {
        let cost = CostEstimate::estimate([(1000, 750), (100, 10)], &PriceTable::default());
        assert_eq!(cost.image_count, 2);
        // 1000 + floor(1.33)
        assert_eq!(cost.estimated_tokens, 1001);
        assert!((cost.estimated_usd - 0.015015).abs() < 1e-12);
        assert!((cost.estimated_jpy - 2.25225).abs() < 1e-9);
    }

    #[test]
    fn test_empty_set_is_free() {
        let cost = CostEstimate::estimate(std::iter::empty::<(u32, u32)>(), &PriceTable::default());
        assert_eq!(cost, CostEstimate::default());
    }

    #[test]
    fn test_display() {
        let cost = CostEstimate::estimate([(750, 1000)], &PriceTable::default());
        assert_eq!(cost.to_string(), "1 images, ~1000 tokens, ~$0.0150 (~¥2.25)");
    }
}
