use std::str::FromStr;

/// RGBA color in [0, 1], not premultiplied.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::new_unpremul(0., 0., 0., 1.);

    pub const fn new_unpremul(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array_unpremul(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn to_array_premul(self) -> [f32; 4] {
        let [r, g, b, a] = self.to_array_unpremul();
        [r * a, g * a, b * a, a]
    }
}

impl FromStr for Color {
    type Err = csscolorparser::ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let color = csscolorparser::parse(s)?;
        Ok(Self::new_unpremul(
            color.r as f32,
            color.g as f32,
            color.b as f32,
            color.a as f32,
        ))
    }
}
