//! Per-model pricing.
//!
//! Prices are USD and only used for the cost column of the provider stats, so
//! a model missing from a table is billed at that vendor's fallback entry
//! rather than rejected.

/// Price of one model
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelPrice {
    /// USD per `unit` input tokens
    pub input: f64,
    /// USD per `unit` output tokens
    pub output: f64,
    /// Number of tokens the prices refer to
    pub unit: f64,
}

impl ModelPrice {
    const fn per_thousand(input: f64, output: f64) -> Self {
        Self {
            input,
            output,
            unit: 1_000.0,
        }
    }

    const fn per_million(input: f64, output: f64) -> Self {
        Self {
            input,
            output,
            unit: 1_000_000.0,
        }
    }

    /// Cost of a request in USD
    #[must_use]
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / self.unit) * self.input
            + (output_tokens as f64 / self.unit) * self.output
    }
}

const OPENAI_PRICES: &[(&str, ModelPrice)] = &[
    ("gpt-4", ModelPrice::per_thousand(0.03, 0.06)),
    ("gpt-4-turbo-preview", ModelPrice::per_thousand(0.01, 0.03)),
    ("gpt-3.5-turbo", ModelPrice::per_thousand(0.0005, 0.0015)),
    ("gpt-3.5-turbo-16k", ModelPrice::per_thousand(0.003, 0.004)),
];
const OPENAI_FALLBACK: &str = "gpt-3.5-turbo";

const ANTHROPIC_PRICES: &[(&str, ModelPrice)] = &[
    ("claude-3-opus-20240229", ModelPrice::per_million(15.00, 75.00)),
    ("claude-3-sonnet-20240229", ModelPrice::per_million(3.00, 15.00)),
    ("claude-3-haiku-20240307", ModelPrice::per_million(0.25, 1.25)),
];
const ANTHROPIC_FALLBACK: &str = "claude-3-sonnet-20240229";

const GOOGLE_PRICES: &[(&str, ModelPrice)] = &[
    ("gemini-1.5-pro", ModelPrice::per_million(3.50, 10.50)),
    ("gemini-1.5-flash", ModelPrice::per_million(0.35, 1.05)),
    ("gemini-pro", ModelPrice::per_million(0.50, 1.50)),
];
const GOOGLE_FALLBACK: &str = "gemini-1.5-flash";

fn lookup(table: &[(&str, ModelPrice)], fallback: &str, model: &str) -> ModelPrice {
    let find = |name: &str| table.iter().find(|(m, _)| *m == name).map(|(_, p)| *p);
    find(model)
        .or_else(|| find(fallback))
        .unwrap_or(ModelPrice::per_million(0.0, 0.0))
}

/// OpenAI price for a model
#[must_use]
pub fn openai_price(model: &str) -> ModelPrice {
    lookup(OPENAI_PRICES, OPENAI_FALLBACK, model)
}

/// Anthropic price for a model
#[must_use]
pub fn anthropic_price(model: &str) -> ModelPrice {
    lookup(ANTHROPIC_PRICES, ANTHROPIC_FALLBACK, model)
}

/// Google price for a model
#[must_use]
pub fn google_price(model: &str) -> ModelPrice {
    lookup(GOOGLE_PRICES, GOOGLE_FALLBACK, model)
}
