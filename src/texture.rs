use crate::ui::RipeCheckApp;
use egui::{Context, TextureOptions};
use image::RgbImage;

impl RipeCheckApp {
    pub fn update_preview_texture(&mut self, ctx: &Context, image: &RgbImage) {
        // Validate image before updating to prevent white flash
        if image.width() == 0 || image.height() == 0 {
            return; // Skip invalid frames
        }

        let size = [image.width() as usize, image.height() as usize];
        let pixels = image.as_flat_samples();

        let color_image = egui::ColorImage::from_rgb(size, pixels.as_slice());

        // Reuse the existing texture across preview updates
        match &mut self.preview_texture {
            Some(texture) => {
                // Only update in place if the size matches to prevent flash
                if texture.size() == size {
                    texture.set(color_image, TextureOptions::NEAREST);
                } else {
                    // Size changed, recreate texture
                    *texture = ctx.load_texture("preview", color_image, TextureOptions::NEAREST);
                }
            }
            None => {
                // First time only
                let texture = ctx.load_texture("preview", color_image, TextureOptions::NEAREST);
                self.preview_texture = Some(texture);
            }
        }
    }
}
