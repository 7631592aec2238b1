//! Persona lookup contract.

/// Resolves agent identities to persona material.
///
/// Implementations never fail: a missing persona is an empty string.
pub trait PersonaSource: Send + Sync {
    /// Canonical agent id for a raw, client-supplied identifier.
    fn normalize(&self, raw: Option<&str>) -> String;

    /// Full persona text for the system prelude.
    fn persona_text(&self, agent_id: &str) -> String;

    /// Short description used to open the behavioural instruction.
    fn persona_description(&self, agent_id: &str) -> String;
}
