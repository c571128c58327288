/// Mint a fresh session identifier: a 128-bit random UUID in canonical
/// hyphenated form. Used when the client does not supply one.
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
