// src/utils.rs
use crate::models::server::EndpointDescriptor;

const JOIN_URL_BASE: &str = "https://acstuff.club/s/q:race/online/join";

/// Content Manager deep link that joins the given server in one click.
pub fn join_url(descriptor: &EndpointDescriptor) -> String {
    format!(
        "{}?ip={}&httpPort={}",
        JOIN_URL_BASE, descriptor.address, descriptor.port
    )
}

/// Reduces a path-shaped track id (`content/tracks/spa`) to its last segment.
/// Missing or empty ids become `"Unknown"`.
pub fn display_map_name(track: Option<&str>) -> String {
    track
        .and_then(|t| t.split(['/', '\\']).filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Replaces every occurrence of `secret` in `text` with a fixed mask.
pub fn redact_secret(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, "[REDACTED]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::server::Category;

    #[test]
    fn join_url_matches_content_manager_format() {
        let descriptor = EndpointDescriptor {
            name: "ABSA Race#5".to_string(),
            address: "203.0.113.7".to_string(),
            port: 8085,
            category: Category::from("Track"),
        };
        assert_eq!(
            join_url(&descriptor),
            "https://acstuff.club/s/q:race/online/join?ip=203.0.113.7&httpPort=8085"
        );
    }

    #[test]
    fn map_name_keeps_last_segment() {
        assert_eq!(display_map_name(Some("content/tracks/spa")), "spa");
        assert_eq!(display_map_name(Some("ks_nordschleife")), "ks_nordschleife");
        assert_eq!(display_map_name(Some("csp/1/../ks_drag/")), "ks_drag");
        assert_eq!(display_map_name(Some("content\\tracks\\imola")), "imola");
    }

    #[test]
    fn map_name_defaults_to_unknown() {
        assert_eq!(display_map_name(None), "Unknown");
        assert_eq!(display_map_name(Some("")), "Unknown");
        assert_eq!(display_map_name(Some("///")), "Unknown");
    }

    #[test]
    fn redact_masks_token() {
        assert_eq!(
            redact_secret("Bot abc.def failed", "abc.def"),
            "Bot [REDACTED] failed"
        );
        assert_eq!(redact_secret("nothing here", ""), "nothing here");
    }
}
