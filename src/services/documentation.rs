use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the QR hunt session API.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::match_stream,
        crate::routes::public::get_match,
        crate::routes::public::get_stats,
        crate::routes::public::get_qr_codes,
        crate::routes::public::register_player,
        crate::routes::public::submit_scan,
        crate::routes::admin::start_match,
        crate::routes::admin::stop_match,
        crate::routes::admin::reset_match,
        crate::routes::admin::set_time,
        crate::routes::admin::add_player,
        crate::routes::admin::remove_player,
        crate::routes::admin::adjust_score,
        crate::routes::admin::export_match,
    ),
    components(
        schemas(
            crate::dto::sse::SystemStatus,
            crate::dto::admin::ResetScope,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events stream"),
        (name = "match", description = "Player registration, scanning and the live view"),
        (
            name = "admin",
            description = "Match lifecycle and roster management (admin sessions only)"
        ),
    )
)]
/// OpenAPI document of every route.
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/sse",
            "/match",
            "/scans",
            "/admin/match/reset",
            "/admin/teams/{team}/players/{name}",
            "/admin/export",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
    }
}
