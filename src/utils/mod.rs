use smithay::utils::{Logical, Physical, Rectangle, Size};

pub mod id;

/// Converts a mode size into the logical size the output exposes at the given scale.
pub fn logical_size(size: Size<i32, Physical>, scale: f64) -> Size<i32, Logical> {
    let w = (f64::from(size.w) / scale).round() as i32;
    let h = (f64::from(size.h) / scale).round() as i32;
    Size::from((w, h))
}

/// Rectangle at the origin covering the given size.
pub fn rect_from_size(size: Size<i32, Logical>) -> Rectangle<i32, Logical> {
    Rectangle::new((0, 0).into(), size)
}
