//! Token scope handling.
//!
//! A scope reads `<type>:<name>:<actions>`, e.g. `repository:busybox:pull`.
//! Docker Hub keeps official images under the implicit `library/`
//! namespace, so bare names must be qualified before asking its auth server.

/// Qualify a single-segment repository name with `library/`.
///
/// Scopes that do not have exactly three parts, or whose name already
/// contains a namespace, are returned unchanged.
pub fn qualify_library_scope(scope: &str) -> String {
    let parts: Vec<&str> = scope.split(':').collect();
    match parts.as_slice() {
        [kind, name, actions] if !name.contains('/') => {
            format!("{kind}:library/{name}:{actions}")
        }
        _ => scope.to_string(),
    }
}

/// Scope to request for `upstream`, rewritten for Docker Hub only. Empty
/// scopes count as absent.
pub fn normalize_scope(scope: Option<&str>, docker_hub: bool) -> Option<String> {
    let scope = scope.filter(|s| !s.is_empty())?;
    if docker_hub {
        Some(qualify_library_scope(scope))
    } else {
        Some(scope.to_string())
    }
}
