use iced::{Background, Border, Color, Shadow, Theme};
use iced::widget::button::{StyleSheet, Appearance};

const ROW_BACKGROUND: Color = Color { r: 0.94, g: 0.95, b: 0.97, a: 1.0 };
const ROW_BACKGROUND_HOVERED: Color = Color { r: 0.86, g: 0.89, b: 0.95, a: 1.0 };

/// A scan result row: a flat card that highlights on hover.
pub struct DeviceRowStyleSheet;

impl DeviceRowStyleSheet {
    fn appearance(background: Color) -> Appearance {
        Appearance {
            shadow_offset: Default::default(),
            background: Some(Background::Color(background)),
            text_color: Color::BLACK,
            border: Border {
                color: Color::TRANSPARENT,
                width: 0.0,
                radius: 8.0.into(),
            },
            shadow: Shadow::default(),
        }
    }
}

impl StyleSheet for DeviceRowStyleSheet {
    type Style = Theme;

    fn active(&self, _style: &Self::Style) -> Appearance {
        DeviceRowStyleSheet::appearance(ROW_BACKGROUND)
    }

    fn hovered(&self, _style: &Self::Style) -> Appearance {
        DeviceRowStyleSheet::appearance(ROW_BACKGROUND_HOVERED)
    }
}
