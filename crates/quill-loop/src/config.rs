/// Knobs for one exchange.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Upper bound on completion rounds within a single user turn. A model
    /// that keeps requesting tools past this is cut off with an error.
    pub max_rounds: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self { max_rounds: 25 }
    }
}
