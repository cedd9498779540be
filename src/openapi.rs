use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::alerts::{Alert, AlertType, Metric};
use crate::error::ErrorResponse;

/// OpenAPI documentation for GardenSentry's operational surface. The alert
/// pipeline itself is timer-driven and has no request/response API; this
/// only documents `/health` and `/metrics`, plus the `Alert` shape pushed
/// over `/ws`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "GardenSentry API",
        version = "1.0.0",
        description = "Climate-risk monitoring and alerting service for registered outdoor gardens.",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        ),
        contact(
            name = "GardenSentry",
            url = "https://github.com/jsprague84/gardensentry"
        )
    ),
    tags(
        (name = "operations", description = "Health and metrics for the alert pipeline"),
    ),
    components(
        schemas(ErrorResponse, Alert, AlertType, Metric)
    )
)]
pub struct ApiDoc;

/// Create the Swagger UI router
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
