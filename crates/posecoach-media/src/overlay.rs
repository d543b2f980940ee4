//! Skeleton overlay drawing.

use image::{Rgb, RgbImage};
use posecoach_models::{LandmarkFrame, POSE_CONNECTIONS};

/// Joint marker color.
pub const JOINT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// Limb connection color.
pub const CONNECTION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Landmarks below this visibility are not drawn.
const DRAW_VISIBILITY_THRESHOLD: f64 = 0.5;
const JOINT_RADIUS: i64 = 2;
const LINE_THICKNESS: i64 = 2;

/// Draw `landmarks` over a copy of `frame`.
///
/// Connections go under the joint markers. Landmarks outside the frame or
/// below the visibility threshold are skipped, so a frame without usable
/// landmarks comes back unchanged.
pub fn annotate(frame: &RgbImage, landmarks: &LandmarkFrame) -> RgbImage {
    let mut out = frame.clone();
    let (w, h) = out.dimensions();

    let point = |joint| {
        landmarks
            .visible(joint, DRAW_VISIBILITY_THRESHOLD)
            .and_then(|lm| to_pixel(lm.x, lm.y, w, h))
    };

    for &(a, b) in POSE_CONNECTIONS {
        if let (Some(p), Some(q)) = (point(a), point(b)) {
            draw_line(&mut out, p, q, CONNECTION_COLOR);
        }
    }

    for joint in landmarks.joints() {
        if let Some(p) = point(joint) {
            fill_disc(&mut out, p, JOINT_RADIUS, JOINT_COLOR);
        }
    }

    out
}

/// Normalized coordinates to pixel coordinates; `None` outside [0, 1].
fn to_pixel(x: f64, y: f64, width: u32, height: u32) -> Option<(i64, i64)> {
    if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
        return None;
    }
    let px = (x * width as f64).floor().min(width.saturating_sub(1) as f64) as i64;
    let py = (y * height as f64).floor().min(height.saturating_sub(1) as f64) as i64;
    Some((px, py))
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn fill_disc(img: &mut RgbImage, (cx, cy): (i64, i64), radius: i64, color: Rgb<u8>) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put(img, cx + dx, cy + dy, color);
            }
        }
    }
}

/// Bresenham line with a square brush.
fn draw_line(img: &mut RgbImage, (x0, y0): (i64, i64), (x1, y1): (i64, i64), color: Rgb<u8>) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);
    let half = LINE_THICKNESS / 2;

    loop {
        for oy in -half..LINE_THICKNESS - half {
            for ox in -half..LINE_THICKNESS - half {
                put(img, x + ox, y + oy, color);
            }
        }
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}
