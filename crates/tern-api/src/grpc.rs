use std::{pin::Pin, sync::Arc};

use futures::stream::{self, Stream};
use tern_core::ListenEvent;
use tern_model::{JobQuery, JobSpec};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::debug;

use crate::convert::{convert_filter, convert_listen};
use crate::error::ApiError;
use crate::handler::ApiHandler;
use crate::proto_api::{self, listen_response::Content, tern_api_server::TernApi};

const TARGET: &str = "tern.api.grpc";

type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

/// gRPC service implementation.
///
/// This struct wraps an `ApiHandler` and implements the generated `TernApi` trait.
pub struct TernApiService<H> {
    handler: Arc<H>,
}

impl<H> TernApiService<H>
where
    H: ApiHandler,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }
}

#[tonic::async_trait]
impl<H> TernApi for TernApiService<H>
where
    H: ApiHandler,
{
    type ListenStream = ResponseStream<proto_api::ListenResponse>;
    type SubscribeStream = ResponseStream<proto_api::SubscribeResponse>;

    async fn start_job(
        &self,
        request: Request<proto_api::StartJobRequest>,
    ) -> Result<Response<proto_api::StartJobResponse>, Status> {
        let spec = request
            .into_inner()
            .spec
            .ok_or_else(|| Status::invalid_argument("missing spec"))?;
        let spec = JobSpec::try_from(spec).map_err(Status::from)?;

        let status = self.handler.start_job(spec).await.map_err(Status::from)?;
        debug!(target: TARGET, job = %status.name, "job started");

        Ok(Response::new(proto_api::StartJobResponse {
            name: status.name.clone(),
            status: Some(status.into()),
        }))
    }

    async fn stop_job(
        &self,
        request: Request<proto_api::StopJobRequest>,
    ) -> Result<Response<proto_api::StopJobResponse>, Status> {
        let req = request.into_inner();
        if req.name.trim().is_empty() {
            return Err(Status::invalid_argument("name cannot be empty"));
        }

        self.handler.stop_job(&req.name).await.map_err(Status::from)?;
        Ok(Response::new(proto_api::StopJobResponse {}))
    }

    async fn get_job(
        &self,
        request: Request<proto_api::GetJobRequest>,
    ) -> Result<Response<proto_api::GetJobResponse>, Status> {
        let req = request.into_inner();
        let status = self.handler.get_job(&req.name).await.map_err(Status::from)?;

        Ok(Response::new(proto_api::GetJobResponse {
            status: Some(status.into()),
        }))
    }

    async fn list_jobs(
        &self,
        request: Request<proto_api::ListJobsRequest>,
    ) -> Result<Response<proto_api::ListJobsResponse>, Status> {
        let req = request.into_inner();

        let mut query = JobQuery::new().with_filter(convert_filter(req.filter)?);
        if req.limit > 0 {
            query = query.with_limit(req.limit as usize);
        }
        query = query.with_offset(req.offset as usize);

        let page = self.handler.list_jobs(query).await.map_err(Status::from)?;
        Ok(Response::new(proto_api::ListJobsResponse {
            total: page.total as u64,
            jobs: page.items.into_iter().map(Into::into).collect(),
        }))
    }

    async fn listen(
        &self,
        request: Request<proto_api::ListenRequest>,
    ) -> Result<Response<Self::ListenStream>, Status> {
        let req = request.into_inner();
        let opts = convert_listen(&req)?;

        let cancel = CancellationToken::new();
        let rx = self
            .handler
            .listen(&req.name, opts, cancel.clone())
            .await
            .map_err(Status::from)?;
        debug!(target: TARGET, job = %req.name, "listener attached");

        // Dropping the response stream (client gone) cancels the listener.
        let guard = cancel.drop_guard();
        let items = stream::unfold((rx, guard), |(mut rx, guard)| async move {
            let item = match rx.recv().await? {
                Ok(ListenEvent::Slice(slice)) => Ok(proto_api::ListenResponse {
                    content: Some(Content::Slice(slice.into())),
                }),
                Ok(ListenEvent::Update(status)) => Ok(proto_api::ListenResponse {
                    content: Some(Content::Update(status.into())),
                }),
                Err(e) => Err(Status::from(ApiError::from(e))),
            };
            Some((item, (rx, guard)))
        });

        Ok(Response::new(Box::pin(items)))
    }

    async fn subscribe(
        &self,
        request: Request<proto_api::SubscribeRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        let filter = convert_filter(request.into_inner().filter)?;
        let sub = self.handler.subscribe(filter);
        debug!(target: TARGET, subscriber = %sub.id(), "subscriber attached");

        let items = stream::unfold(sub, |mut sub| async move {
            let status = sub.recv().await?;
            let item = proto_api::SubscribeResponse {
                status: Some(status.into()),
            };
            Some((Ok(item), sub))
        });

        Ok(Response::new(Box::pin(items)))
    }
}
