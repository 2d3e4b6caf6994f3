//! Page layout calculations for rendered record pages

/// Simple length type in millimeters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length(pub f64);

impl Length {
    /// Create a length from millimeters
    pub fn from_mm(mm: f64) -> Self {
        Length(mm)
    }

    /// Create a length from inches
    pub fn from_inches(inches: f64) -> Self {
        Length(inches * 25.4)
    }

    /// Get the value in millimeters
    pub fn mm(&self) -> f64 {
        self.0
    }

    /// Get the value in points (1/72 inch)
    pub fn pt(&self) -> f64 {
        self.0 * 72.0 / 25.4
    }
}

/// Page dimensions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageDimensions {
    pub width: Length,
    pub height: Length,
}

impl PageDimensions {
    /// US Letter size (8.5" × 11")
    pub fn letter() -> Self {
        Self {
            width: Length::from_mm(215.9),
            height: Length::from_mm(279.4),
        }
    }

    /// A4 size (210mm × 297mm)
    pub fn a4() -> Self {
        Self {
            width: Length::from_mm(210.0),
            height: Length::from_mm(297.0),
        }
    }

    /// `/MediaBox` rectangle in points, origin at bottom-left
    pub fn media_box(&self) -> [f32; 4] {
        [0.0, 0.0, self.width.pt() as f32, self.height.pt() as f32]
    }
}

/// Margins for page content
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: Length,
    pub bottom: Length,
    pub left: Length,
    pub right: Length,
}

impl Margins {
    /// Create margins with same value on all sides
    pub fn uniform(margin: Length) -> Self {
        Self {
            top: margin,
            bottom: margin,
            left: margin,
            right: margin,
        }
    }

    /// Standard 1-inch margins on all sides
    pub fn standard() -> Self {
        Self::uniform(Length::from_inches(1.0))
    }
}

/// Content area inside the margins, in points
///
/// Returns (left, top, right, bottom) measured from the page origin.
/// The coordinate system has origin at bottom-left of the page.
pub fn content_area(page: &PageDimensions, margins: &Margins) -> (f64, f64, f64, f64) {
    let left = margins.left.pt();
    let top = page.height.pt() - margins.top.pt();
    let right = page.width.pt() - margins.right.pt();
    let bottom = margins.bottom.pt();

    (left, top, right, bottom)
}

/// How many text lines of a given leading fit between top and bottom
pub fn lines_that_fit(page: &PageDimensions, margins: &Margins, leading: f64) -> usize {
    let (_, top, _, bottom) = content_area(page, margins);
    if leading <= 0.0 || top <= bottom {
        return 0;
    }
    ((top - bottom) / leading).floor() as usize
}
