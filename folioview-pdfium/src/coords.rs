//! PDF user space (bottom-left origin, y up) to folioview page space
//! (top-left of the visible page box, y down).

use folioview_core::TextRun;

/// Edges of a rectangle in PDF user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfEdges {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

/// Places a text segment relative to the page box, which may not start at
/// the user space origin.
pub fn text_run(text: String, segment: PdfEdges, page_box: PdfEdges) -> TextRun {
    TextRun {
        text,
        x: segment.left - page_box.left,
        y: page_box.top - segment.top,
        width: (segment.right - segment.left).max(0.0),
        font_size_estimate: (segment.top - segment.bottom).abs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_is_measured_from_page_box_corner() {
        let page_box = PdfEdges {
            left: 0.0,
            bottom: 0.0,
            right: 612.0,
            top: 792.0,
        };
        let segment = PdfEdges {
            left: 72.0,
            bottom: 700.0,
            right: 172.0,
            top: 712.0,
        };
        let run = text_run("Abstract".into(), segment, page_box);
        assert_eq!((run.x, run.y), (72.0, 80.0));
        assert_eq!((run.width, run.font_size_estimate), (100.0, 12.0));
    }

    #[test]
    fn offset_page_box_shifts_runs() {
        let page_box = PdfEdges {
            left: 36.0,
            bottom: 18.0,
            right: 648.0,
            top: 810.0,
        };
        let segment = PdfEdges {
            left: 36.0,
            bottom: 798.0,
            right: 90.0,
            top: 810.0,
        };
        let run = text_run("1".into(), segment, page_box);
        assert_eq!((run.x, run.y), (0.0, 0.0));
        assert_eq!(run.width, 54.0);
    }
}
