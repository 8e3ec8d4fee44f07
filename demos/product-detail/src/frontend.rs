use crate::product::ProductApi;
use crate::{query_param, respond};
use app_obs::{KeyValue, Observability, Telemetry};
use http::{Request, Response, StatusCode};

/// The public entry point: validates requests and asks the product service.
#[derive(Clone, Debug)]
pub(crate) struct Frontend {
    telemetry: Telemetry,
    product: ProductApi,
}

impl Frontend {
    pub(crate) fn new(telemetry: Telemetry, product: ProductApi) -> Self {
        Frontend { telemetry, product }
    }

    pub(crate) async fn handle(&self, request: Request<()>) -> Response<String> {
        let obs = self.telemetry.observability_from_headers(request.headers());
        let (obs, _guard) = obs.start_span(
            "Frontend.HandleRequest",
            vec![KeyValue::new("http.target", request.uri().to_string())],
        );

        let Some(product_id) = query_param(request.uri(), "id") else {
            obs.log().error("missing identifier");
            return respond(StatusCode::BAD_REQUEST, "missing identifier");
        };

        let log = obs.log().with_field("productID", product_id.clone());
        log.debug("Processing request");
        match self.get_product_info(&obs, &product_id).await {
            Ok(info) => {
                log.info("Successfully retrieved product info");
                respond(StatusCode::OK, info)
            }
            Err(status) => {
                log.with_field("status", i64::from(status.as_u16()))
                    .warn("Product lookup failed");
                respond(status, format!("product {product_id} unavailable"))
            }
        }
    }

    async fn get_product_info(
        &self,
        obs: &Observability,
        product_id: &str,
    ) -> Result<String, StatusCode> {
        let (obs, _guard) = obs.start_span(
            "callProductService",
            vec![KeyValue::new("product.id", product_id.to_owned())],
        );

        let mut request = Request::get(format!("/product?id={product_id}"))
            .body(())
            .map_err(|_| StatusCode::BAD_REQUEST)?;
        obs.inject_headers(request.headers_mut());

        let response = self.product.serve(request).await;
        if response.status() != StatusCode::OK {
            obs.log()
                .with_field("status", i64::from(response.status().as_u16()))
                .error(format!(
                    "product service returned status {}",
                    response.status().as_u16()
                ));
            return Err(response.status());
        }
        Ok(response.into_body())
    }
}
