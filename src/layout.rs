//! Layout generators.
//!
//! A layout generator arranges the tiled views of an output. The output sends it a
//! [`LayoutDemand`] at the start of every transaction and waits for one rectangle per view. In-core
//! generators answer right away; proxies for external processes answer later through
//! `Root::commit_layout`.

use smithay::utils::{Logical, Rectangle};

use crate::output::OutputId;
use crate::utils::id::IdCounter;
use crate::view::ViewId;

static LAYOUT_ID_COUNTER: IdCounter = IdCounter::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutId(u64);

impl LayoutId {
    pub fn next() -> LayoutId {
        LayoutId(LAYOUT_ID_COUNTER.next())
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutDemand {
    pub serial: u32,
    pub output: OutputId,
    pub tags: u32,
    /// Area available to tiled views, relative to the output.
    pub usable_area: Rectangle<i32, Logical>,
    /// Views to arrange, in window-management stack order.
    pub views: Vec<ViewId>,
}

pub trait LayoutGenerator {
    fn namespace(&self) -> &str;

    /// Asks the generator to arrange the views of the demand.
    ///
    /// Returns the boxes right away, relative to the usable area, or `None` if the answer comes
    /// later.
    fn demand(&mut self, demand: &LayoutDemand) -> Option<Vec<Rectangle<i32, Logical>>>;
}

/// A generator registered on an output.
pub struct Layout {
    id: LayoutId,
    generator: Box<dyn LayoutGenerator>,
}

impl Layout {
    pub fn new(generator: Box<dyn LayoutGenerator>) -> Self {
        Self {
            id: LayoutId::next(),
            generator,
        }
    }

    pub fn id(&self) -> LayoutId {
        self.id
    }

    pub fn namespace(&self) -> &str {
        self.generator.namespace()
    }

    pub fn demand(&mut self, demand: &LayoutDemand) -> Option<Vec<Rectangle<i32, Logical>>> {
        self.generator.demand(demand)
    }
}

impl std::fmt::Debug for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layout")
            .field("id", &self.id)
            .field("namespace", &self.namespace())
            .finish()
    }
}

/// Main/stack tiling: the first views share a main column, the rest stack beside it.
#[derive(Debug, Clone)]
pub struct TileLayout {
    namespace: String,
    pub main_count: usize,
    /// Fraction of the width taken by the main column.
    pub main_ratio: f64,
    /// Gap around and between views.
    pub padding: i32,
}

impl TileLayout {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            main_count: 1,
            main_ratio: 0.6,
            padding: 0,
        }
    }

    fn arrange(&self, count: usize, area: Rectangle<i32, Logical>) -> Vec<Rectangle<i32, Logical>> {
        let main_count = self.main_count.clamp(1, count.max(1)).min(count);
        let stack_count = count - main_count;

        let main_w = if stack_count == 0 {
            area.size.w
        } else {
            (f64::from(area.size.w) * self.main_ratio.clamp(0.1, 0.9)).round() as i32
        };
        let stack_w = area.size.w - main_w;

        let mut boxes = column(main_count, 0, main_w, area.size.h);
        boxes.extend(column(stack_count, main_w, stack_w, area.size.h));

        let pad = self.padding;
        for rect in &mut boxes {
            rect.loc.x += pad;
            rect.loc.y += pad;
            rect.size.w = (rect.size.w - 2 * pad).max(1);
            rect.size.h = (rect.size.h - 2 * pad).max(1);
        }
        boxes
    }
}

/// Splits a column evenly, giving the remainder to the first rows.
fn column(count: usize, x: i32, w: i32, h: i32) -> Vec<Rectangle<i32, Logical>> {
    if count == 0 {
        return Vec::new();
    }

    let count_i = i32::try_from(count).unwrap_or(i32::MAX);
    let base = h / count_i;
    let extra = h % count_i;

    let mut y = 0;
    (0..count_i)
        .map(|i| {
            let row_h = base + i32::from(i < extra);
            let rect = Rectangle::new((x, y).into(), (w, row_h).into());
            y += row_h;
            rect
        })
        .collect()
}

impl LayoutGenerator for TileLayout {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn demand(&mut self, demand: &LayoutDemand) -> Option<Vec<Rectangle<i32, Logical>>> {
        let area = Rectangle::new((0, 0).into(), demand.usable_area.size);
        Some(self.arrange(demand.views.len(), area))
    }
}
