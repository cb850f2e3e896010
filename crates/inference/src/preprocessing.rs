use crate::errors::InferenceError;
use common::{span, span_debug};
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use image::RgbImage;
use ndarray::{Array, IxDyn};

pub const DEFAULT_INPUT_SIZE: (u32, u32) = (640, 640);
const LETTERBOX_COLOR: u8 = 114;

/// Decode an encoded image (JPEG, PNG, WebP, BMP, GIF) into packed RGB8.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, InferenceError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Geometry of one letterbox pass, used to map model boxes back onto the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub orig_width: u32,
    pub orig_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Letterbox {
    /// Map a point from model input space to source pixels, clamped to the image.
    #[inline]
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        let sx = ((x - self.offset_x) / self.scale).clamp(0.0, self.orig_width as f32);
        let sy = ((y - self.offset_y) / self.scale).clamp(0.0, self.orig_height as f32);
        (sx, sy)
    }
}

pub struct PreProcessor {
    pub input_size: (u32, u32),
    rgb_buffer: Vec<u8>,
    letterboxed_buffer: Vec<u8>,
}

impl PreProcessor {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            rgb_buffer: Vec::with_capacity(1920 * 1080 * 3),
            letterboxed_buffer: vec![LETTERBOX_COLOR; (input_size.0 * input_size.1 * 3) as usize],
        }
    }

    /// Letterbox `image` into the model input and return the NCHW tensor in `[0, 1]`.
    pub fn preprocess(
        &mut self,
        image: &RgbImage,
    ) -> anyhow::Result<(Array<f32, IxDyn>, Letterbox)> {
        let _s = span!("preprocess_image");

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            anyhow::bail!("Cannot preprocess an empty {}x{} image", width, height);
        }

        tracing::trace!(width, height, "Preprocessing image dimensions");

        self.rgb_buffer.clear();
        self.rgb_buffer.extend_from_slice(image.as_raw());

        let letterbox = self.resize_and_letterbox(width, height)?;
        let input = self.normalize()?;

        Ok((input, letterbox))
    }

    fn resize_and_letterbox(&mut self, width: u32, height: u32) -> anyhow::Result<Letterbox> {
        let _s = span!("resize_and_letterbox");

        let (input_width, input_height) = self.input_size;
        let scale = (input_width as f32 / width as f32).min(input_height as f32 / height as f32);
        let new_width = ((width as f32 * scale).round() as u32).clamp(1, input_width);
        let new_height = ((height as f32 * scale).round() as u32).clamp(1, input_height);

        let offset_x = (input_width - new_width) / 2;
        let offset_y = (input_height - new_height) / 2;

        let src = Image::from_slice_u8(width, height, &mut self.rgb_buffer, PixelType::U8x3)?;
        let mut resized = Image::new(new_width, new_height, PixelType::U8x3);

        Resizer::new().resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        self.letterboxed_buffer
            .resize((input_width * input_height * 3) as usize, LETTERBOX_COLOR);
        self.letterboxed_buffer.fill(LETTERBOX_COLOR);

        let resized_data = resized.buffer();
        let stride = input_width * 3;
        let row_len = (new_width * 3) as usize;

        for y in 0..new_height {
            let src_row = (y * new_width * 3) as usize;
            let dst_row = ((y + offset_y) * stride + offset_x * 3) as usize;

            self.letterboxed_buffer[dst_row..dst_row + row_len]
                .copy_from_slice(&resized_data[src_row..src_row + row_len]);
        }

        Ok(Letterbox {
            orig_width: width,
            orig_height: height,
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        })
    }

    fn normalize(&self) -> anyhow::Result<Array<f32, IxDyn>> {
        let _s = span_debug!("normalize");

        let width = self.input_size.0 as usize;
        let height = self.input_size.1 as usize;
        let spatial = width * height;

        let mut output = vec![0.0f32; 3 * spatial];

        for (i, px) in self.letterboxed_buffer.chunks_exact(3).enumerate() {
            output[i] = px[0] as f32 / 255.0;
            output[i + spatial] = px[1] as f32 / 255.0;
            output[i + 2 * spatial] = px[2] as f32 / 255.0;
        }

        Ok(Array::from_shape_vec(IxDyn(&[1, 3, height, width]), output)?)
    }
}

impl Default for PreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}
