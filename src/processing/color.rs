use anyhow::{Result, anyhow};
use image::RgbImage;
use tracing::debug;

/// Converts pixels from their embedded ICC profile (typically Display P3 on
/// phone photos) to sRGB. Any failure leaves the pixels as they are, treated
/// as sRGB already.
pub fn normalize_to_srgb(mut image: RgbImage, icc_profile: Option<&[u8]>) -> RgbImage {
    let Some(profile) = icc_profile else {
        return image;
    };
    match convert_in_place(&mut image, profile) {
        Ok(()) => debug!("converted embedded ICC profile to sRGB"),
        Err(err) => debug!("could not convert ICC profile: {err:#}; using pixels as-is"),
    }
    image
}

fn convert_in_place(image: &mut RgbImage, profile: &[u8]) -> Result<()> {
    let input = qcms::Profile::new_from_slice(profile, false)
        .ok_or_else(|| anyhow!("embedded ICC profile could not be parsed"))?;
    let output = qcms::Profile::new_sRGB();
    let transform = qcms::Transform::new(
        &input,
        &output,
        qcms::DataType::RGB8,
        qcms::Intent::Perceptual,
    )
    .ok_or_else(|| anyhow!("no transform from embedded profile to sRGB"))?;
    transform.apply(&mut **image);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use image::Rgb;

    // Display P3 primaries, D65 white, gamma 2.2 TRC; ICC v2.1 matrix/shaper
    const DISPLAY_P3_ICC: &str = concat!(
        "AAACYGxjbXMCEAAAbW50clJHQiBYWVogB+oACgATAAUAMgAxYWNzcEFQUEwAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAPbW",
        "AAEAAAAA0y1sY21zAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAALZGVzYwAAAQgAAACE",
        "Y3BydAAAAYwAAAAhd3RwdAAAAbAAAAAUY2hhZAAAAcQAAAAsclhZWgAAAfAAAAAUYlhZWgAAAgQAAAAUZ1hZWgAAAhgAAAAU",
        "clRSQwAAAiwAAAAOZ1RSQwAAAiwAAAAOYlRSQwAAAiwAAAAOY2hybQAAAjwAAAAkZGVzYwAAAAAAAAANUkdCIGJ1aWx0LWlu",
        "AAAAAAAAAAANAFIARwBCACAAYgB1AGkAbAB0AC0AaQBuAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
        "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAdGV4dAAAAABObyBjb3B5cmlnaHQsIHVzZSBmcmVlbHkAAAAA",
        "WFlaIAAAAAAAAPbWAAEAAAAA0y1zZjMyAAAAAAABDEIAAAXe///zJQAAB5MAAP2Q///7of///aIAAAPcAADAblhZWiAAAAAA",
        "AACD3wAAPb////+7WFlaIAAAAAAAACg4AAARCwAAyLlYWVogAAAAAAAASr8AALE3AAAKuWN1cnYAAAAAAAAAAQIzAABjaHJt",
        "AAAAAAADAAAAAK4UAABR7AAAQ9cAALCkAAAmZgAAD1w=",
    );

    fn display_p3() -> Vec<u8> {
        base64::engine::general_purpose::STANDARD
            .decode(DISPLAY_P3_ICC)
            .unwrap()
    }

    #[test]
    fn missing_profile_is_identity() {
        let img = RgbImage::from_pixel(2, 2, Rgb([12, 34, 56]));
        assert_eq!(normalize_to_srgb(img.clone(), None), img);
    }

    #[test]
    fn broken_profile_falls_back_to_raw_pixels() {
        let img = RgbImage::from_pixel(2, 2, Rgb([200, 100, 50]));
        let out = normalize_to_srgb(img.clone(), Some(b"not an icc profile"));
        assert_eq!(out, img);
    }

    #[test]
    fn display_p3_pixels_are_converted() {
        let mut img = RgbImage::new(3, 1);
        img.put_pixel(0, 0, Rgb([200, 100, 50]));
        img.put_pixel(1, 0, Rgb([40, 180, 90]));
        img.put_pixel(2, 0, Rgb([128, 128, 128]));
        let out = normalize_to_srgb(img, Some(&display_p3()));

        // wider gamut: the same values become more saturated in sRGB
        let [r, g, b] = out.get_pixel(0, 0).0;
        assert!(r >= 208 && g <= 98 && b <= 40, "got {:?}", [r, g, b]);
        let [r, g, _] = out.get_pixel(1, 0).0;
        assert!(r <= 20 && g >= 180, "got {:?}", [r, g]);
        // neutrals stay neutral
        let [r, g, b] = out.get_pixel(2, 0).0;
        assert!(r.abs_diff(128) <= 3 && r.abs_diff(g) <= 1 && r.abs_diff(b) <= 1);
    }
}
