/// Errors detected when loading a composite rule.
///
/// Fatal at configuration load, like expression errors.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// The textual rule form could not be parsed.
    #[error("composite rule parse error at offset {pos}: {message}")]
    Parse { pos: usize, message: String },

    /// The rule references an alarm that is not configured.
    #[error("composite rule references undefined alarm '{0}'")]
    UnknownAlarm(String),
}
