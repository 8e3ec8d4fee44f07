use crate::{query_param, respond};
use app_obs::logs::FieldValue;
use app_obs::{KeyValue, Observability, Telemetry};
use http::{Request, Response, StatusCode};
use std::time::Duration;

#[derive(Clone, Debug, thiserror::Error)]
pub(crate) enum ProductError {
    #[error("product not found")]
    NotFound,
}

/// The product service's HTTP surface.
#[derive(Clone, Debug)]
pub(crate) struct ProductApi {
    telemetry: Telemetry,
    service: ProductService,
}

impl ProductApi {
    pub(crate) fn new(telemetry: Telemetry) -> Self {
        ProductApi {
            telemetry,
            service: ProductService {
                repo: ProductRepository,
            },
        }
    }

    /// Continues the caller's trace and routes the request.
    pub(crate) async fn serve(&self, mut request: Request<()>) -> Response<String> {
        let obs = self.telemetry.observability_from_headers(request.headers());
        let (obs, _guard) = obs.start_span("ProductApi.GetProduct", vec![]);
        obs.store_in(request.extensions_mut());
        self.get_product(request).await
    }

    async fn get_product(&self, request: Request<()>) -> Response<String> {
        let obs = Observability::from_extensions(request.extensions());
        let Some(product_id) = query_param(request.uri(), "id") else {
            obs.log().error("missing identifier");
            return respond(StatusCode::BAD_REQUEST, "missing identifier");
        };

        match self.service.get_product_info(&obs, &product_id).await {
            Ok(info) => respond(StatusCode::OK, info),
            Err(err @ ProductError::NotFound) => respond(StatusCode::NOT_FOUND, err.to_string()),
        }
    }
}

#[derive(Clone, Debug)]
struct ProductService {
    repo: ProductRepository,
}

impl ProductService {
    async fn get_product_info(
        &self,
        obs: &Observability,
        product_id: &str,
    ) -> Result<String, ProductError> {
        let (obs, _guard) = obs.start_span(
            "ProductService.GetProductInfo",
            vec![KeyValue::new("product.id", product_id.to_owned())],
        );
        let log = obs.log().with_field("productID", product_id.to_owned());
        log.debug("Processing request");

        // the repository finds the handle in its ambient context
        match obs.scope(self.repo.get_product_by_id(product_id.to_owned())).await {
            Ok(info) => {
                log.with_field("productInfo", info.clone())
                    .info("Successfully retrieved product info");
                Ok(info)
            }
            Err(err) => {
                log.with([("error", FieldValue::error(err.clone()))])
                    .error("Error fetching product");
                Err(err)
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ProductRepository;

impl ProductRepository {
    async fn get_product_by_id(&self, id: String) -> Result<String, ProductError> {
        let (obs, _guard) = Observability::current().start_span(
            "ProductRepository.GetProductByID",
            vec![KeyValue::new("product.id", id.clone())],
        );
        let log = obs.log().with_field("productID", id.clone());
        log.debug("Fetching product data");

        tokio::time::sleep(Duration::from_millis(5)).await;

        if id.starts_with("missing-") {
            log.warn("Product not found in repository");
            return Err(ProductError::NotFound);
        }

        log.debug("Product found in repository");
        Ok(format!("Product ABC with ID {id}"))
    }
}
