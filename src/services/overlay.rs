// Overlay rendering: status box, status text and the upper-body skeleton

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;
use std::fs;
use std::path::Path;

use crate::config::OverlayConfig;
use crate::models::{Assessment, LandmarkSet, PostureClassification, SKELETON_CONNECTIONS};

const STATUS_BOX_WIDTH: u32 = 300;
const STATUS_BOX_HEIGHT: u32 = 80;

const GOOD_COLOR: Rgb<u8> = Rgb([0, 200, 83]);
const BAD_COLOR: Rgb<u8> = Rgb([229, 57, 53]);
const CALIBRATING_COLOR: Rgb<u8> = Rgb([245, 117, 16]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([120, 120, 120]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BONE_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Box color for a classification
pub fn status_color(classification: &PostureClassification) -> Rgb<u8> {
    match classification {
        PostureClassification::Good => GOOD_COLOR,
        PostureClassification::Bad(_) => BAD_COLOR,
        PostureClassification::Calibrating { .. } | PostureClassification::Calibrate => {
            CALIBRATING_COLOR
        }
        PostureClassification::Unknown => UNKNOWN_COLOR,
    }
}

pub struct OverlayRenderer {
    draw_skeleton: bool,
    font: Option<FontVec>,
}

impl OverlayRenderer {
    pub fn new(config: &OverlayConfig) -> Self {
        let font = config.font_path.as_deref().and_then(load_font);

        Self {
            draw_skeleton: config.draw_skeleton,
            font,
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw the overlay in place
    pub fn render(
        &self,
        image: &mut RgbImage,
        landmarks: Option<&LandmarkSet>,
        assessment: &Assessment,
        min_visibility: f32,
    ) {
        if self.draw_skeleton {
            if let Some(landmarks) = landmarks {
                self.draw_skeleton(image, landmarks, assessment, min_visibility);
            }
        }
        self.draw_status(image, assessment);
    }

    fn draw_status(&self, image: &mut RgbImage, assessment: &Assessment) {
        let (width, height) = image.dimensions();
        let box_width = STATUS_BOX_WIDTH.min(width);
        let box_height = STATUS_BOX_HEIGHT.min(height);
        if box_width == 0 || box_height == 0 {
            return;
        }

        let classification = &assessment.classification;
        draw_filled_rect_mut(
            image,
            Rect::at(0, 0).of_size(box_width, box_height),
            status_color(classification),
        );

        let Some(font) = self.font.as_ref() else {
            return;
        };

        draw_text_mut(image, TEXT_COLOR, 10, 6, PxScale::from(14.0), font, "POSTURE");
        draw_text_mut(image, TEXT_COLOR, 10, 22, PxScale::from(30.0), font, classification.tag().as_str());

        let mut detail = classification.reason();
        if let Some(metrics) = assessment.metrics {
            detail = format!("{} ({:.1} deg)", detail, metrics.shoulder_angle);
        }
        draw_text_mut(image, TEXT_COLOR, 10, 58, PxScale::from(14.0), font, &detail);
    }

    fn draw_skeleton(
        &self,
        image: &mut RgbImage,
        landmarks: &LandmarkSet,
        assessment: &Assessment,
        min_visibility: f32,
    ) {
        let (width, height) = image.dimensions();
        let joint_color = status_color(&assessment.classification);

        for (from, to) in SKELETON_CONNECTIONS {
            let (Some(a), Some(b)) = (
                landmarks.visible(from, min_visibility),
                landmarks.visible(to, min_visibility),
            ) else {
                continue;
            };
            draw_line_segment_mut(
                image,
                a.to_pixel(width, height),
                b.to_pixel(width, height),
                BONE_COLOR,
            );
        }

        for (_, landmark) in landmarks.iter() {
            if !landmark.is_visible(min_visibility) {
                continue;
            }
            let (x, y) = landmark.to_pixel(width, height);
            draw_filled_circle_mut(image, (x.round() as i32, y.round() as i32), 4, joint_color);
        }
    }
}

fn load_font(path: &Path) -> Option<FontVec> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!("Failed to read overlay font {}: {}", path.display(), e);
            return None;
        }
    };

    match FontVec::try_from_vec(data) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!("Invalid overlay font {}: {}", path.display(), e);
            None
        }
    }
}
