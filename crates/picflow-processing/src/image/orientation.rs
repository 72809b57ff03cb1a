use image::DynamicImage;

/// EXIF orientation correction (rotation and flipping)
pub struct ImageOrientation;

impl ImageOrientation {
    /// Rotation and flip operations that bring an image stored with the given EXIF
    /// orientation upright. Rotation is applied first.
    ///
    /// Returns (rotate_angle_cw, flip_horizontal, flip_vertical)
    pub fn transforms(orientation: u8) -> (Option<u16>, bool, bool) {
        match orientation {
            1 => (None, false, false),      // Normal
            2 => (None, true, false),       // Mirror horizontal
            3 => (Some(180), false, false), // Rotate 180
            4 => (None, false, true),       // Mirror vertical
            5 => (Some(90), true, false),   // Transpose
            6 => (Some(90), false, false),  // Rotate 90 CW
            7 => (Some(270), true, false),  // Transverse
            8 => (Some(270), false, false), // Rotate 270 CW
            _ => (None, false, false),      // Invalid, treat as normal
        }
    }

    /// Apply EXIF orientation correction to a decoded image.
    ///
    /// The orientation must come from the bytes the image was decoded from; the
    /// decoder itself does not rotate.
    pub fn apply(img: DynamicImage, orientation: u8) -> DynamicImage {
        let (rotate, flip_h, flip_v) = Self::transforms(orientation);
        if rotate.is_none() && !flip_h && !flip_v {
            return img;
        }

        tracing::debug!(
            orientation = orientation,
            rotate = ?rotate,
            flip_horizontal = flip_h,
            flip_vertical = flip_v,
            "Applying EXIF orientation"
        );

        let mut img = match rotate {
            Some(90) => img.rotate90(),
            Some(180) => img.rotate180(),
            Some(270) => img.rotate270(),
            _ => img,
        };
        if flip_h {
            img = img.fliph();
        }
        if flip_v {
            img = img.flipv();
        }
        img
    }
}
