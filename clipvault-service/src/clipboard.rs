//! Clipboard access
//!
//! `SystemClipboard` talks to the OS clipboard through arboard. `MemoryClipboard`
//! is an in-process clipboard used for headless runs and tests.

use crate::clip::ClipContent;
use crate::protocol::Ack;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::borrow::Cow;
use std::io::Cursor;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{trace, warn};

#[derive(Error, Debug)]
pub enum ClipboardError {
    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),
    #[error("Image encoding failed: {0}")]
    Encode(String),
    #[error("Image payload is not a decodable image: {0}")]
    InvalidImage(String),
}

/// Read/write access to a clipboard
pub trait ClipboardSource: Send {
    /// Current text, or None when the clipboard holds no text
    fn read_text(&mut self) -> Result<Option<String>, ClipboardError>;

    /// Current image encoded as PNG, or None when the clipboard holds no image
    fn read_png(&mut self) -> Result<Option<Vec<u8>>, ClipboardError>;

    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError>;

    fn write_image(&mut self, image: &DynamicImage) -> Result<(), ClipboardError>;
}

/// Put a clip back on the clipboard. Image payloads must decode.
pub fn write_content(source: &mut dyn ClipboardSource, content: &ClipContent) -> Ack {
    let result = match content {
        ClipContent::Text { text } => source.write_text(text),
        ClipContent::Image { image_data } => image::load_from_memory(image_data)
            .map_err(|e| ClipboardError::InvalidImage(e.to_string()))
            .and_then(|image| source.write_image(&image)),
    };

    match result {
        Ok(()) => Ack::ok(),
        Err(e) => {
            warn!("Failed to set clipboard: {}", e);
            Ack::failed(e.to_string())
        }
    }
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ClipboardError> {
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| ClipboardError::Encode(e.to_string()))?;
    Ok(png)
}

/// OS clipboard backed by arboard
pub struct SystemClipboard {
    inner: arboard::Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self, ClipboardError> {
        let inner =
            arboard::Clipboard::new().map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl ClipboardSource for SystemClipboard {
    fn read_text(&mut self) -> Result<Option<String>, ClipboardError> {
        match self.inner.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(ClipboardError::Unavailable(e.to_string())),
        }
    }

    fn read_png(&mut self) -> Result<Option<Vec<u8>>, ClipboardError> {
        let data = match self.inner.get_image() {
            Ok(data) => data,
            Err(arboard::Error::ContentNotAvailable) => return Ok(None),
            Err(e) => return Err(ClipboardError::Unavailable(e.to_string())),
        };

        let Some(rgba) = RgbaImage::from_raw(
            data.width as u32,
            data.height as u32,
            data.bytes.into_owned(),
        ) else {
            trace!("Clipboard image has inconsistent dimensions, ignoring");
            return Ok(None);
        };

        encode_png(&DynamicImage::ImageRgba8(rgba)).map(Some)
    }

    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.inner
            .set_text(text)
            .map_err(|e| ClipboardError::Unavailable(e.to_string()))
    }

    fn write_image(&mut self, image: &DynamicImage) -> Result<(), ClipboardError> {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let data = arboard::ImageData {
            width: width as usize,
            height: height as usize,
            bytes: Cow::Owned(rgba.into_raw()),
        };
        self.inner
            .set_image(data)
            .map_err(|e| ClipboardError::Unavailable(e.to_string()))
    }
}

#[derive(Debug, Default)]
struct MemoryContents {
    text: Option<String>,
    png: Option<Vec<u8>>,
}

/// In-process clipboard. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    contents: Arc<Mutex<MemoryContents>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryContents> {
        self.contents.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the contents with text
    pub fn set_text(&self, text: &str) {
        let mut contents = self.lock();
        contents.text = Some(text.to_string());
        contents.png = None;
    }

    /// Replace the contents with an already-encoded PNG
    pub fn set_png(&self, png: Vec<u8>) {
        let mut contents = self.lock();
        contents.text = None;
        contents.png = Some(png);
    }

    pub fn clear(&self) {
        let mut contents = self.lock();
        contents.text = None;
        contents.png = None;
    }

    pub fn text(&self) -> Option<String> {
        self.lock().text.clone()
    }

    pub fn png(&self) -> Option<Vec<u8>> {
        self.lock().png.clone()
    }
}

impl ClipboardSource for MemoryClipboard {
    fn read_text(&mut self) -> Result<Option<String>, ClipboardError> {
        Ok(self.text())
    }

    fn read_png(&mut self) -> Result<Option<Vec<u8>>, ClipboardError> {
        Ok(self.png())
    }

    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.set_text(text);
        Ok(())
    }

    fn write_image(&mut self, image: &DynamicImage) -> Result<(), ClipboardError> {
        let png = encode_png(image)?;
        self.set_png(png);
        Ok(())
    }
}
