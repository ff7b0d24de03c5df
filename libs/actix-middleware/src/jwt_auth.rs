use crate::token::{extract_token, AuthContext, TokenError, TokenVerifier};
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::InternalError,
    Error, HttpMessage, HttpResponse,
};
use futures::future::{ready, Ready};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

/// JWT Authentication Middleware
///
/// Resolves the caller from a bearer header or the `accessToken` cookie and
/// stores an [`AuthContext`] in the request extensions. Requests without a
/// valid credential are answered with `401 {"message": "Unauthorized"}`.
#[derive(Clone)]
pub struct JwtAuthMiddleware {
    verifier: Arc<TokenVerifier>,
}

impl JwtAuthMiddleware {
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self { verifier }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = JwtAuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddlewareService {
            service: Rc::new(service),
            verifier: self.verifier.clone(),
        }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    service: Rc<S>,
    verifier: Arc<TokenVerifier>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let verifier = self.verifier.clone();

        Box::pin(async move {
            let identity = match extract_token(&req) {
                Some(token) => verifier.verify(&token),
                None => Err(TokenError::Missing),
            };

            match identity {
                Ok(ctx) => {
                    req.extensions_mut().insert(ctx);
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(e) => {
                    tracing::warn!(path = %req.path(), error = %e, "authentication failed");
                    Ok(req.into_response(unauthorized_response()).map_into_right_body())
                }
            }
        })
    }
}

fn unauthorized_response() -> HttpResponse {
    HttpResponse::Unauthorized().json(serde_json::json!({ "message": "Unauthorized" }))
}

fn unauthorized(e: TokenError) -> Error {
    InternalError::from_response(e, unauthorized_response()).into()
}

/// FromRequest implementation for AuthContext
impl actix_web::FromRequest for AuthContext {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        match req.extensions().get::<AuthContext>() {
            Some(ctx) => ready(Ok(*ctx)),
            None => ready(Err(unauthorized(TokenError::Missing))),
        }
    }
}
