use crate::appearance::Color;
use crate::utils::FloatOrInt;

/// Per-output settings, matched against the connector name.
#[derive(knuffel::Decode, Debug, Default, Clone, PartialEq)]
pub struct Output {
    #[knuffel(argument)]
    pub name: String,
    #[knuffel(child)]
    pub off: bool,
    #[knuffel(child, unwrap(argument))]
    pub scale: Option<FloatOrInt<0, 10>>,
    /// Overrides the process-wide default layout namespace for this output.
    #[knuffel(child, unwrap(argument))]
    pub layout_namespace: Option<String>,
    #[knuffel(child, unwrap(argument, str))]
    pub background_color: Option<Color>,
}

impl Output {
    pub fn scale(&self) -> f64 {
        match self.scale {
            // Zero would make the logical size infinite.
            Some(FloatOrInt(scale)) if scale > 0. => scale,
            _ => 1.,
        }
    }

    pub fn background_color(&self) -> Color {
        self.background_color.unwrap_or(Color::BLACK)
    }
}
