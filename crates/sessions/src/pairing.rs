//! QR-code pairing for tenants without a protocol identity.
//!
//! ```text
//! NoIdentity ─begin─▶ AwaitingScan ─code─▶ CodeIssued ─code─▶ CodeIssued …
//!      │                   │                    │
//!      │ already paired    ├──── timeout ───────┴──▶ TimedOut
//!      ▼                   └──── success ───────────▶ PairedSuccess
//!  PairedSuccess
//! ```

use std::{io::Cursor, sync::Arc};

use {
    base64::Engine as _,
    image::{ImageFormat, Luma},
    qrcode::{QrCode, render::unicode::Dense1x2},
    tokio::sync::mpsc,
    tracing::{info, warn},
    wagate_channels::{ClientError, PairingSignal, ProtocolClient},
    wagate_common::{Envelope, EventKind, TenantId},
    wagate_config::PairingConfig,
};

use crate::{error::SessionError, services::SessionServices};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingOptions {
    /// Minimum edge length of the rendered PNG.
    pub qr_size: u32,
    /// Print each code to the terminal as well.
    pub print_terminal: bool,
}

impl Default for PairingOptions {
    fn default() -> Self {
        Self::from(&PairingConfig::default())
    }
}

impl From<&PairingConfig> for PairingOptions {
    fn from(cfg: &PairingConfig) -> Self {
        Self {
            qr_size: cfg.qr_size,
            print_terminal: cfg.print_terminal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    NoIdentity,
    AwaitingScan,
    CodeIssued,
    TimedOut,
    PairedSuccess,
}

/// Result of feeding one signal to the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Keep waiting; dispatch the envelope if there is one.
    Continue(Option<Envelope>),
    Paired { jid: Option<String> },
    TimedOut,
}

pub struct PairingMachine {
    tenant: TenantId,
    token: String,
    services: Arc<SessionServices>,
    state: PairingState,
    codes_issued: usize,
}

impl PairingMachine {
    pub fn new(tenant: TenantId, token: &str, services: Arc<SessionServices>) -> Self {
        Self {
            tenant,
            token: token.to_string(),
            services,
            state: PairingState::NoIdentity,
            codes_issued: 0,
        }
    }

    pub fn state(&self) -> PairingState {
        self.state
    }

    pub fn codes_issued(&self) -> usize {
        self.codes_issued
    }

    /// Open the pairing channel and connect.
    ///
    /// Returns `None` when the device turned out to be paired already, in
    /// which case the client is connected and no codes will follow.
    pub async fn begin(
        &mut self,
        client: &dyn ProtocolClient,
    ) -> Result<Option<mpsc::Receiver<PairingSignal>>, SessionError> {
        let rx = match client.pairing_channel().await {
            Ok(rx) => Some(rx),
            Err(ClientError::AlreadyPaired) => {
                info!(tenant = %self.tenant, "device already paired, skipping pairing");
                None
            },
            Err(e) => return Err(SessionError::PairingFailed(e.to_string())),
        };
        client.connect().await?;
        self.state = match rx {
            Some(_) => PairingState::AwaitingScan,
            None => PairingState::PairedSuccess,
        };
        Ok(rx)
    }

    pub async fn on_signal(&mut self, signal: PairingSignal) -> Result<Step, SessionError> {
        match signal {
            PairingSignal::Code(code) => Ok(Step::Continue(self.issue(&code).await)),
            PairingSignal::Timeout => {
                info!(tenant = %self.tenant, "pairing timed out");
                self.clear_code().await?;
                self.state = PairingState::TimedOut;
                Ok(Step::TimedOut)
            },
            PairingSignal::Success { jid } => {
                info!(tenant = %self.tenant, jid = ?jid, "pairing succeeded");
                if let Some(jid) = jid.as_deref().filter(|j| !j.is_empty()) {
                    self.services
                        .cache
                        .set_jid(
                            self.services.store.as_ref(),
                            self.tenant,
                            &self.token,
                            jid,
                        )
                        .await?;
                }
                self.clear_code().await?;
                self.state = PairingState::PairedSuccess;
                Ok(Step::Paired { jid })
            },
            PairingSignal::Other(name) => {
                info!(tenant = %self.tenant, signal = %name, "pairing signal");
                Ok(Step::Continue(None))
            },
        }
    }

    /// Render, persist and announce one code. Failures here are logged; the
    /// next code gets another chance.
    async fn issue(&mut self, code: &str) -> Option<Envelope> {
        let data_uri = match render_data_uri(code, self.services.pairing.qr_size) {
            Ok(uri) => uri,
            Err(e) => {
                warn!(tenant = %self.tenant, error = %e, "failed to render pairing code");
                return None;
            },
        };
        if let Err(e) = self
            .services
            .store
            .set_pairing_code(self.tenant, &data_uri)
            .await
        {
            warn!(tenant = %self.tenant, error = %e, "failed to persist pairing code");
        }
        if self.services.pairing.print_terminal
            && let Some(rendered) = render_terminal(code)
        {
            println!("\n{rendered}\n");
        }
        self.state = PairingState::CodeIssued;
        self.codes_issued += 1;
        info!(tenant = %self.tenant, n = self.codes_issued, "pairing code issued");
        Some(
            Envelope::new(EventKind::PairingCodeIssued, serde_json::json!({}))
                .with_field("code", data_uri),
        )
    }

    async fn clear_code(&self) -> Result<(), SessionError> {
        self.services
            .store
            .set_pairing_code(self.tenant, "")
            .await
            .map_err(Into::into)
    }
}

/// Encode `code` as a QR PNG and wrap it in a `data:` URI.
pub fn render_data_uri(code: &str, size: u32) -> Result<String, SessionError> {
    let qr = QrCode::new(code.as_bytes()).map_err(|e| SessionError::PairingFailed(e.to_string()))?;
    let img = qr.render::<Luma<u8>>().min_dimensions(size, size).build();
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| SessionError::PairingFailed(e.to_string()))?;
    Ok(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    ))
}

/// Half-block rendering suitable for a terminal.
pub fn render_terminal(code: &str) -> Option<String> {
    let qr = QrCode::new(code.as_bytes()).ok()?;
    Some(
        qr.render::<Dense1x2>()
            .dark_color(Dense1x2::Light)
            .light_color(Dense1x2::Dark)
            .build(),
    )
}
