use std::fmt::{self, Write};

use super::color::{Color, BLACK};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    #[default]
    Start,
    Middle,
    End,
}

impl Anchor {
    fn as_svg(&self) -> &'static str {
        match self {
            Anchor::Start => "start",
            Anchor::Middle => "middle",
            Anchor::End => "end",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size: f64,
    pub anchor: Anchor,
    pub bold: bool,
    pub color: Color,
}

impl TextStyle {
    pub fn new(size: f64) -> Self {
        Self {
            size,
            anchor: Anchor::Start,
            bold: false,
            color: BLACK,
        }
    }

    pub fn anchored(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }
}

#[derive(Debug, Clone)]
enum Element {
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        fill: Option<Color>,
        stroke: Option<Color>,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        color: Color,
        width: f64,
    },
    Polyline {
        points: Vec<(f64, f64)>,
        color: Color,
        width: f64,
    },
    Text {
        x: f64,
        y: f64,
        content: String,
        style: TextStyle,
        rotate: bool,
    },
}

/// An SVG drawing surface. Elements are emitted in the order they were added.
///
#[derive(Debug, Clone)]
pub struct Canvas {
    pub width: f64,
    pub height: f64,
    elements: Vec<Element>,
}

impl Canvas {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            elements: vec![],
        }
    }

    pub fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, fill: Color) {
        self.elements.push(Element::Rect {
            x,
            y,
            width,
            height,
            fill: Some(fill),
            stroke: None,
        });
    }

    pub fn outline(&mut self, x: f64, y: f64, width: f64, height: f64, stroke: Color) {
        self.elements.push(Element::Rect {
            x,
            y,
            width,
            height,
            fill: None,
            stroke: Some(stroke),
        });
    }

    pub fn line(&mut self, from: (f64, f64), to: (f64, f64), color: Color, width: f64) {
        self.elements.push(Element::Line {
            x1: from.0,
            y1: from.1,
            x2: to.0,
            y2: to.1,
            color,
            width,
        });
    }

    pub fn polyline(&mut self, points: Vec<(f64, f64)>, color: Color, width: f64) {
        if points.len() > 1 {
            self.elements.push(Element::Polyline {
                points,
                color,
                width,
            });
        }
    }

    pub fn text<S: Into<String>>(&mut self, x: f64, y: f64, content: S, style: TextStyle) {
        self.elements.push(Element::Text {
            x,
            y,
            content: content.into(),
            style,
            rotate: false,
        });
    }

    /// Text reading bottom to top, for vertical axis labels
    pub fn vertical_text<S: Into<String>>(&mut self, x: f64, y: f64, content: S, style: TextStyle) {
        self.elements.push(Element::Text {
            x,
            y,
            content: content.into(),
            style,
            rotate: true,
        });
    }

    pub fn to_svg(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif">"#,
            w = self.width,
            h = self.height,
        )?;
        writeln!(
            f,
            r#"<rect width="{}" height="{}" fill="white"/>"#,
            self.width, self.height
        )?;
        for element in &self.elements {
            render_element(f, element)?;
        }

        f.write_str("</svg>\n")
    }
}

fn render_element<W: Write>(out: &mut W, element: &Element) -> fmt::Result {
    match element {
        Element::Rect {
            x,
            y,
            width,
            height,
            fill,
            stroke,
        } => {
            let fill = fill.map_or_else(|| String::from("none"), |color| color.to_string());
            write!(
                out,
                r#"<rect x="{x:.2}" y="{y:.2}" width="{width:.2}" height="{height:.2}" fill="{fill}""#
            )?;
            if let Some(stroke) = stroke {
                write!(out, r#" stroke="{stroke}""#)?;
            }
            writeln!(out, "/>")
        }
        Element::Line {
            x1,
            y1,
            x2,
            y2,
            color,
            width,
        } => writeln!(
            out,
            r#"<line x1="{x1:.2}" y1="{y1:.2}" x2="{x2:.2}" y2="{y2:.2}" stroke="{color}" stroke-width="{width}"/>"#
        ),
        Element::Polyline {
            points,
            color,
            width,
        } => {
            out.write_str(r#"<polyline points=""#)?;
            for (i, (x, y)) in points.iter().enumerate() {
                if i > 0 {
                    out.write_char(' ')?;
                }
                write!(out, "{x:.2},{y:.2}")?;
            }
            writeln!(
                out,
                r#"" fill="none" stroke="{color}" stroke-width="{width}"/>"#
            )
        }
        Element::Text {
            x,
            y,
            content,
            style,
            rotate,
        } => {
            write!(
                out,
                r#"<text x="{x:.2}" y="{y:.2}" font-size="{}" text-anchor="{}" fill="{}""#,
                style.size,
                style.anchor.as_svg(),
                style.color
            )?;
            if style.bold {
                out.write_str(r#" font-weight="bold""#)?;
            }
            if *rotate {
                write!(out, r#" transform="rotate(-90 {x:.2} {y:.2})""#)?;
            }
            writeln!(out, ">{}</text>", escape(content))
        }
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }

    escaped
}
