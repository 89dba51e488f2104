//! Per-request billing (spec §4.4.1) — distinct from
//! [`gateway_core::ChannelConfig::resolve_cost`], which scores the
//! LOWEST_COST strategy. This is what actually gets charged to a caller's
//! budget, keyed by the *public* model id the client asked for.

const FALLBACK: (&str, f64, f64) = ("gpt-3.5-turbo", 0.0005, 0.0015);

const PRICING_TABLE: &[(&str, f64, f64)] = &[
    ("gpt-4", 0.03, 0.06),
    ("gpt-4-turbo", 0.01, 0.03),
    ("gpt-3.5-turbo", 0.0005, 0.0015),
    ("gpt-3.5-turbo-16k", 0.001, 0.002),
    ("claude-3-opus", 0.015, 0.075),
    ("claude-3-sonnet", 0.003, 0.015),
    ("claude-3-haiku", 0.00025, 0.00125),
    ("gemini-pro", 0.0005, 0.0015),
    ("gemini-ultra", 0.001, 0.003),
];

/// `(tokens_in/1000)*input_price + (tokens_out/1000)*output_price`, rounded
/// to 6 decimal places. Unknown models fall back to gpt-3.5-turbo pricing.
pub fn compute_cost(public_model_id: &str, tokens_in: u32, tokens_out: u32) -> f64 {
    let (_, input_price, output_price) = PRICING_TABLE
        .iter()
        .find(|(id, _, _)| *id == public_model_id)
        .copied()
        .unwrap_or(FALLBACK);

    let raw = (tokens_in as f64 / 1000.0) * input_price + (tokens_out as f64 / 1000.0) * output_price;
    (raw * 1_000_000.0).round() / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_uses_its_own_prices() {
        let cost = compute_cost("gpt-4", 1000, 1000);
        assert_eq!(cost, 0.03 + 0.06);
    }

    #[test]
    fn unknown_model_falls_back_to_gpt35() {
        let cost = compute_cost("some-future-model", 1000, 1000);
        assert_eq!(cost, 0.0005 + 0.0015);
    }

    #[test]
    fn rounds_to_six_decimal_places() {
        let cost = compute_cost("claude-3-haiku", 7, 3);
        assert_eq!(cost, ((7.0 / 1000.0 * 0.00025 + 3.0 / 1000.0 * 0.00125) * 1_000_000.0_f64).round() / 1_000_000.0);
    }
}
