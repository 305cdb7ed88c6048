//! Deterministic in-memory [`EcrApi`] for state machine tests
//!
//! Each operation is answered by an optional closure; operations without one
//! fail with an `Unconfigured` API error.

use crate::registry::api::*;
use async_trait::async_trait;
use std::sync::Arc;

type Handler<I, O> = Box<dyn Fn(I) -> Result<O, ApiError> + Send + Sync>;

#[derive(Default)]
pub struct FakeEcrClient {
    batch_get_image: Option<Handler<BatchGetImageInput, BatchGetImageOutput>>,
    get_download_url_for_layer: Option<Handler<GetDownloadUrlForLayerInput, GetDownloadUrlForLayerOutput>>,
    batch_check_layer_availability:
        Option<Handler<BatchCheckLayerAvailabilityInput, BatchCheckLayerAvailabilityOutput>>,
    initiate_layer_upload: Option<Handler<InitiateLayerUploadInput, InitiateLayerUploadOutput>>,
    upload_layer_part: Option<Handler<UploadLayerPartInput, UploadLayerPartOutput>>,
    complete_layer_upload: Option<Handler<CompleteLayerUploadInput, CompleteLayerUploadOutput>>,
    put_image: Option<Handler<PutImageInput, PutImageOutput>>,
}

impl FakeEcrClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_get_image(
        mut self,
        f: impl Fn(BatchGetImageInput) -> Result<BatchGetImageOutput, ApiError> + Send + Sync + 'static,
    ) -> Self {
        self.batch_get_image = Some(Box::new(f));
        self
    }

    pub fn with_get_download_url_for_layer(
        mut self,
        f: impl Fn(GetDownloadUrlForLayerInput) -> Result<GetDownloadUrlForLayerOutput, ApiError> + Send + Sync + 'static,
    ) -> Self {
        self.get_download_url_for_layer = Some(Box::new(f));
        self
    }

    pub fn with_batch_check_layer_availability(
        mut self,
        f: impl Fn(BatchCheckLayerAvailabilityInput) -> Result<BatchCheckLayerAvailabilityOutput, ApiError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.batch_check_layer_availability = Some(Box::new(f));
        self
    }

    pub fn with_initiate_layer_upload(
        mut self,
        f: impl Fn(InitiateLayerUploadInput) -> Result<InitiateLayerUploadOutput, ApiError> + Send + Sync + 'static,
    ) -> Self {
        self.initiate_layer_upload = Some(Box::new(f));
        self
    }

    pub fn with_upload_layer_part(
        mut self,
        f: impl Fn(UploadLayerPartInput) -> Result<UploadLayerPartOutput, ApiError> + Send + Sync + 'static,
    ) -> Self {
        self.upload_layer_part = Some(Box::new(f));
        self
    }

    pub fn with_complete_layer_upload(
        mut self,
        f: impl Fn(CompleteLayerUploadInput) -> Result<CompleteLayerUploadOutput, ApiError> + Send + Sync + 'static,
    ) -> Self {
        self.complete_layer_upload = Some(Box::new(f));
        self
    }

    pub fn with_put_image(
        mut self,
        f: impl Fn(PutImageInput) -> Result<PutImageOutput, ApiError> + Send + Sync + 'static,
    ) -> Self {
        self.put_image = Some(Box::new(f));
        self
    }

    pub fn into_client(self) -> Arc<dyn EcrApi> {
        Arc::new(self)
    }
}

fn call<I, O>(handler: &Option<Handler<I, O>>, name: &str, input: I) -> Result<O, ApiError> {
    match handler {
        Some(f) => f(input),
        None => Err(ApiError::new("Unconfigured", format!("fake client has no {} handler", name))),
    }
}

#[async_trait]
impl EcrApi for FakeEcrClient {
    async fn batch_get_image(&self, input: BatchGetImageInput) -> Result<BatchGetImageOutput, ApiError> {
        call(&self.batch_get_image, "BatchGetImage", input)
    }

    async fn get_download_url_for_layer(
        &self,
        input: GetDownloadUrlForLayerInput,
    ) -> Result<GetDownloadUrlForLayerOutput, ApiError> {
        call(&self.get_download_url_for_layer, "GetDownloadUrlForLayer", input)
    }

    async fn batch_check_layer_availability(
        &self,
        input: BatchCheckLayerAvailabilityInput,
    ) -> Result<BatchCheckLayerAvailabilityOutput, ApiError> {
        call(&self.batch_check_layer_availability, "BatchCheckLayerAvailability", input)
    }

    async fn initiate_layer_upload(
        &self,
        input: InitiateLayerUploadInput,
    ) -> Result<InitiateLayerUploadOutput, ApiError> {
        call(&self.initiate_layer_upload, "InitiateLayerUpload", input)
    }

    async fn upload_layer_part(&self, input: UploadLayerPartInput) -> Result<UploadLayerPartOutput, ApiError> {
        call(&self.upload_layer_part, "UploadLayerPart", input)
    }

    async fn complete_layer_upload(
        &self,
        input: CompleteLayerUploadInput,
    ) -> Result<CompleteLayerUploadOutput, ApiError> {
        call(&self.complete_layer_upload, "CompleteLayerUpload", input)
    }

    async fn put_image(&self, input: PutImageInput) -> Result<PutImageOutput, ApiError> {
        call(&self.put_image, "PutImage", input)
    }
}
