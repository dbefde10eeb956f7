/// Accumulates human-readable explanations of a decision.
///
/// Errors are always surfaced. Informational entries are kept only when the
/// caller asked for them, so the common path never allocates per step.
#[derive(Debug, Default)]
pub struct DecisionReasons {
    include_info: bool,
    errors: Vec<String>,
    infos: Vec<String>,
}

impl DecisionReasons {
    pub fn new(include_info: bool) -> DecisionReasons {
        DecisionReasons {
            include_info,
            errors: Vec::new(),
            infos: Vec::new(),
        }
    }

    /// Record a critical problem; always included in the output.
    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Record an informational step; dropped unless reasons were requested.
    pub fn info(&mut self, message: impl Into<String>) {
        if self.include_info {
            self.infos.push(message.into());
        }
    }

    /// Errors first, then informational entries in recording order.
    pub fn into_vec(self) -> Vec<String> {
        let mut all = self.errors;
        all.extend(self.infos);
        all
    }
}
