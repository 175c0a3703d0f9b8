use std::path::PathBuf;

use {
    reqwest::{
        Client,
        multipart::{Form, Part},
    },
    tracing::debug,
    wagate_common::TenantId,
};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook answered with status {0}")]
    Status(u16),
    #[error("failed to read attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dispatch queue is full")]
    QueueFull,
    #[error("dispatch queue is closed")]
    Closed,
}

/// One webhook POST waiting to be sent.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tenant: TenantId,
    pub url: String,
    pub token: String,
    /// JSON-encoded envelope, sent as the `data` field.
    pub data: String,
    /// File uploaded alongside `data` and `token` as multipart.
    pub attachment: Option<PathBuf>,
}

/// POST one delivery. Form-encoded without attachment, multipart with one.
/// Any 4xx/5xx status is reported as [`DispatchError::Status`].
pub async fn deliver(client: &Client, delivery: &Delivery) -> Result<(), DispatchError> {
    let request = client.post(&delivery.url);
    let request = match &delivery.attachment {
        None => request.form(&[
            ("data", delivery.data.as_str()),
            ("token", delivery.token.as_str()),
        ]),
        Some(path) => {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|source| DispatchError::Attachment {
                    path: path.clone(),
                    source,
                })?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "attachment".into());
            let form = Form::new()
                .text("data", delivery.data.clone())
                .text("token", delivery.token.clone())
                .part("file", Part::bytes(bytes).file_name(file_name));
            request.multipart(form)
        },
    };

    let response = request.send().await?;
    let status = response.status();
    debug!(
        tenant = %delivery.tenant,
        url = %delivery.url,
        status = status.as_u16(),
        multipart = delivery.attachment.is_some(),
        "webhook delivered"
    );
    if status.is_client_error() || status.is_server_error() {
        return Err(DispatchError::Status(status.as_u16()));
    }
    Ok(())
}
