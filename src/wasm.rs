//! Browser binding.
//!
//! The page decodes files itself (an `<img>` drawn to a canvas, then
//! `getImageData`), so loads arrive as raw RGBA together with the ticket
//! handed out by `beginLoad`. Bytes can also be decoded here with `load`.

use js_sys::{Array, Object, Reflect, Uint8Array};
use wasm_bindgen::prelude::*;

use crate::color::css;
use crate::error::PixelateError;
use crate::palette::{COLORS_PER_PAGE, PaletteEntry};
use crate::pixels::image_from_raw;
use crate::session::{ImageCrateDecoder, LoadOutcome, Orchestrator, PixelateOptions};

fn js_err(e: PixelateError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn entry_object(name: &str, entry: &PaletteEntry) -> Result<Object, JsValue> {
    let obj = Object::new();
    Reflect::set(&obj, &JsValue::from_str("name"), &JsValue::from_str(name))?;
    Reflect::set(&obj, &JsValue::from_str("css"), &JsValue::from_str(&css(entry.color)))?;
    Reflect::set(&obj, &JsValue::from_str("red"), &JsValue::from(entry.color.red))?;
    Reflect::set(&obj, &JsValue::from_str("green"), &JsValue::from(entry.color.green))?;
    Reflect::set(&obj, &JsValue::from_str("blue"), &JsValue::from(entry.color.blue))?;
    Reflect::set(&obj, &JsValue::from_str("count"), &JsValue::from(entry.count))?;
    Reflect::set(&obj, &JsValue::from_str("hidden"), &JsValue::from_bool(entry.hidden))?;
    Ok(obj)
}

/// One image session, driven from JavaScript.
#[wasm_bindgen]
pub struct PixelSession {
    inner: Orchestrator,
}

#[wasm_bindgen]
impl PixelSession {
    #[wasm_bindgen(constructor)]
    pub fn new() -> PixelSession {
        PixelSession { inner: Orchestrator::new(PixelateOptions::default()) }
    }

    /// Decode `input` with the bundled decoders and pixelate it.
    pub fn load(&mut self, input: Vec<u8>) -> Result<Object, JsValue> {
        self.inner.load_image(&input, &ImageCrateDecoder).map_err(js_err)?;
        self.snapshot()
    }

    /// Reserve a ticket for a decode running on the JavaScript side.
    #[wasm_bindgen(js_name = beginLoad)]
    pub fn begin_load(&mut self) -> f64 {
        self.inner.begin_load().generation() as f64
    }

    /// Hand over RGBA pixels decoded for `ticket`. Returns `null` when a newer
    /// load has been requested in the meantime.
    #[wasm_bindgen(js_name = completeLoad)]
    pub fn complete_load(&mut self, ticket: f64, width: u32, height: u32, rgba: Vec<u8>) -> Result<JsValue, JsValue> {
        let decoded = image_from_raw(rgba, width, height);
        match self.inner.complete_load((ticket as u64).into(), decoded).map_err(js_err)? {
            LoadOutcome::Applied => Ok(self.snapshot()?.into()),
            LoadOutcome::Stale => Ok(JsValue::NULL),
        }
    }

    /// Report a failed decode for `ticket`.
    #[wasm_bindgen(js_name = failLoad)]
    pub fn fail_load(&mut self, ticket: f64, reason: String) -> Result<(), JsValue> {
        self.inner
            .complete_load((ticket as u64).into(), Err(PixelateError::Decode(reason)))
            .map(|_| ())
            .map_err(js_err)
    }

    #[wasm_bindgen(js_name = setBlockSize)]
    pub fn set_block_size(&mut self, text: &str) -> Result<Object, JsValue> {
        self.inner.set_block_size_text(text).map_err(js_err)?;
        self.snapshot()
    }

    #[wasm_bindgen(js_name = setNumberOfColors)]
    pub fn set_number_of_colors(&mut self, text: &str) -> Result<Object, JsValue> {
        self.inner.set_target_color_count_text(text).map_err(js_err)?;
        self.snapshot()
    }

    #[wasm_bindgen(js_name = toggleVisibility)]
    pub fn toggle_visibility(&mut self, name: &str) -> Result<Object, JsValue> {
        self.inner.toggle_visibility(name).map_err(js_err)?;
        self.snapshot()
    }

    #[wasm_bindgen(js_name = canvasHidden)]
    pub fn canvas_hidden(&self) -> bool {
        self.inner.canvas_hidden()
    }

    /// `{ width, height, pixels, palette, pageCount }` for the current image,
    /// where `palette` is the displayed palette in legend order.
    pub fn snapshot(&self) -> Result<Object, JsValue> {
        let result = Object::new();
        let Some(session) = self.inner.session() else {
            return Ok(result);
        };

        let palette_js = Array::new();
        for (name, entry) in session.displayed_palette().iter() {
            let obj = entry_object(name, entry)?;
            palette_js.push(&obj);
        }

        Reflect::set(&result, &JsValue::from_str("width"), &JsValue::from(session.width()))?;
        Reflect::set(&result, &JsValue::from_str("height"), &JsValue::from(session.height()))?;
        Reflect::set(&result, &JsValue::from_str("pixels"), &Uint8Array::from(session.surface().as_raw().as_slice()))?;
        Reflect::set(&result, &JsValue::from_str("palette"), &palette_js)?;
        Reflect::set(
            &result,
            &JsValue::from_str("pageCount"),
            &JsValue::from(session.displayed_palette().page_count(COLORS_PER_PAGE) as u32),
        )?;
        Ok(result)
    }

    /// One legend page (1-based, clamped) of the displayed palette.
    pub fn page(&self, page: u32) -> Result<Array, JsValue> {
        let out = Array::new();
        if let Some(session) = self.inner.session() {
            for (name, entry) in session.displayed_palette().page(page as usize, COLORS_PER_PAGE) {
                let obj = entry_object(name, entry)?;
                out.push(&obj);
            }
        }
        Ok(out)
    }
}

impl Default for PixelSession {
    fn default() -> Self {
        Self::new()
    }
}
