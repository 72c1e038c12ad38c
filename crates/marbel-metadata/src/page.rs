//! Profile page presentation helpers: titles, descriptions and avatar URLs.

/// Rendered head metadata for a profile page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMeta {
    pub title: String,
    pub description: String,
    pub image: String,
}

/// Deterministic placeholder avatar for a handle that has no picture yet.
pub fn default_avatar(handle: &str) -> String {
    format!("https://avatar.tobi.sh/{handle}.png")
}

/// Fallback avatar for a profile page; keyed on owner plus handle so two
/// profiles under one wallet do not collide.
pub fn profile_avatar_fallback(owned_by: &str, handle: &str) -> String {
    format!("https://avatar.tobi.sh/{owned_by}_{handle}.png")
}

/// Head metadata for a profile page. The title carries the display name
/// when one is set, otherwise just the handle.
pub fn profile_page_meta(
    name: Option<&str>,
    handle: &str,
    bio: Option<&str>,
    picture_url: Option<&str>,
    owned_by: &str,
    app_name: &str,
) -> PageMeta {
    let title = match name {
        Some(name) => format!("{name} (@{handle}) \u{2022} {app_name}"),
        None => format!("@{handle} \u{2022} {app_name}"),
    };
    PageMeta {
        title,
        description: bio.unwrap_or_default().to_string(),
        image: picture_url
            .map(str::to_string)
            .unwrap_or_else(|| profile_avatar_fallback(owned_by, handle)),
    }
}
