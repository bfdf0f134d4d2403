//! Cache file naming.

/// Sanitize a key for use in filenames.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

/// Base name shared by the provider-side cache files of one app registration.
pub fn account_key(client_id: &str, tenant_id: &str) -> String {
    sanitize_key(&format!("{}-{}", client_id, tenant_id))
}
