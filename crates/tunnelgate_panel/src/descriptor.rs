// --- File: crates/tunnelgate_panel/src/descriptor.rs ---
//! Connection descriptors: the vless URI of an account and its QR rendering.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;
use tracing::debug;
use tunnelgate_common::services::ConnectionDescriptor;

use crate::client::PanelClient;
use crate::error::PanelError;
use crate::users::VLESS_FLOW;

/// Pixel size of one QR module.
const QR_MODULE_PX: u32 = 8;

/// Formats the vless URI for a proxy identity.
pub fn vless_uri(proxy_id: &str, host: &str, port: u16, username: &str) -> String {
    format!(
        "vless://{id}@{host}:{port}?encryption=none&flow={flow}&security=tls&sni={host}&type=tcp&headerType=none#{name}",
        id = proxy_id,
        host = host,
        port = port,
        flow = VLESS_FLOW,
        name = username,
    )
}

/// Renders `data` as a PNG QR code and returns it as a `data:image/png;base64,` URL.
pub fn generate_qr_code(data: &str) -> Result<String, PanelError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M)
        .map_err(|e| PanelError::QrCodeError(e.to_string()))?;
    let img = code
        .render::<Luma<u8>>()
        .module_dimensions(QR_MODULE_PX, QR_MODULE_PX)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| PanelError::QrCodeError(e.to_string()))?;

    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}

impl PanelClient {
    /// Fetches the user and formats its vless URI.
    ///
    /// Fails with [`PanelError::MissingProxyId`] when the account has no vless identity.
    pub async fn get_vless_config(
        &self,
        username: &str,
        host: &str,
        port: u16,
    ) -> Result<String, PanelError> {
        let account = self
            .get_user(username)
            .await
            .map_err(|e| e.during("get_vless_config", username))?;
        let proxy_id = account
            .proxy_id
            .ok_or_else(|| PanelError::MissingProxyId(username.to_string()))?;
        Ok(vless_uri(&proxy_id, host, port, username))
    }

    /// The vless URI of the user together with its QR image.
    pub async fn connection_descriptor(
        &self,
        username: &str,
        host: &str,
        port: u16,
    ) -> Result<ConnectionDescriptor, PanelError> {
        let uri = self.get_vless_config(username, host, port).await?;
        let qr_code = generate_qr_code(&uri).map_err(|e| e.during("connection_descriptor", username))?;
        debug!("[Panel] Built connection descriptor for '{}'", username);
        Ok(ConnectionDescriptor { uri, qr_code })
    }
}
