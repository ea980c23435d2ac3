//! Page walker: finds where each image XObject is drawn.
//!
//! Content streams are parsed with a graphics-state stack so every `Do` of an
//! image is recorded with the CTM in effect at that point. Form XObjects are
//! entered recursively with their `/Matrix` applied.

use crate::image_object::is_image_xobject;
use flate2::read::ZlibDecoder;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::rc::Rc;
use tracing::{debug, warn};

/// Deepest Form XObject nesting followed
const MAX_FORM_DEPTH: usize = 32;
/// Levels of `/Parent` searched for inherited resources
const MAX_PARENT_DEPTH: usize = 64;
/// Form XObject entries followed on one page
pub const MAX_FORM_VISITS: usize = 4096;
/// Placements recorded on one page before the walk stops
pub const MAX_PLACEMENTS_PER_PAGE: usize = 10_000;

/// 2D transformation matrix [a, b, c, d, e, f]
/// Represents: | a b 0 |
///             | c d 0 |
///             | e f 1 |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub fn identity() -> Self {
        Matrix {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: 0.0,
            f: 0.0,
        }
    }

    /// self * other
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    /// Length of the image's x axis in user space
    pub fn scale_x(&self) -> f64 {
        (self.a * self.a + self.b * self.b).sqrt()
    }

    /// Length of the image's y axis in user space
    pub fn scale_y(&self) -> f64 {
        (self.c * self.c + self.d * self.d).sqrt()
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Bounding box of the unit square under this transform
    pub fn unit_bbox(&self) -> Rect {
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(1.0, 0.0),
            self.apply(0.0, 1.0),
            self.apply(1.0, 1.0),
        ];
        let mut rect = Rect {
            x0: f64::INFINITY,
            y0: f64::INFINITY,
            x1: f64::NEG_INFINITY,
            y1: f64::NEG_INFINITY,
        };
        for (x, y) in corners {
            rect.x0 = rect.x0.min(x);
            rect.y0 = rect.y0.min(y);
            rect.x1 = rect.x1.max(x);
            rect.y1 = rect.y1.max(y);
        }
        rect
    }
}

/// Rectangle in page space, in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Rect { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }
}

/// One occurrence of an image drawn on a page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    /// 1-based page number
    pub page: u32,
    /// Bounding box on the page, in points
    pub rect: Rect,
    /// Placed width in points, measured along the image's x axis
    pub width_pt: f64,
    /// Placed height in points, measured along the image's y axis
    pub height_pt: f64,
    /// 1-based ordinal among this image's placements on the page
    pub index: usize,
    /// Number of placements of this image on the page
    pub count: usize,
}

impl Placement {
    /// Placement of an axis-aligned rectangle.
    pub fn from_rect(page: u32, rect: Rect) -> Self {
        Placement {
            page,
            rect,
            width_pt: rect.width(),
            height_pt: rect.height(),
            index: 1,
            count: 1,
        }
    }

    fn from_ctm(page: u32, ctm: &Matrix) -> Self {
        Placement {
            page,
            rect: ctm.unit_bbox(),
            width_pt: ctm.scale_x(),
            height_pt: ctm.scale_y(),
            index: 1,
            count: 1,
        }
    }

    pub fn is_drawable(&self) -> bool {
        self.width_pt.is_finite()
            && self.height_pt.is_finite()
            && self.width_pt > 0.0
            && self.height_pt > 0.0
    }
}

/// An image drawn on one page, with all of its placements there
#[derive(Debug, Clone)]
pub struct DrawnImage {
    pub id: ObjectId,
    pub placements: Vec<Placement>,
}

/// Images drawn on a page, in order of first appearance
#[derive(Debug, Clone)]
pub struct PageImages {
    pub page_number: u32,
    pub images: Vec<DrawnImage>,
}

/// Scan every page of the document.
pub fn scan_pages(doc: &Document) -> Vec<PageImages> {
    doc.get_pages()
        .into_iter()
        .map(|(page_number, page_id)| PageScanner::new(doc, page_number).scan(page_id))
        .collect()
}

/// Walks the content of a single page
struct PageScanner<'a> {
    doc: &'a Document,
    page_number: u32,
    images: Vec<DrawnImage>,
    index: HashMap<ObjectId, usize>,
    /// Forms currently being scanned, to break cycles
    form_stack: Vec<ObjectId>,
    /// Parsed form content, shared across repeated draws
    forms: HashMap<ObjectId, Rc<Vec<Operation>>>,
    form_visits: usize,
    placements: usize,
    /// Set once a per-page limit is hit; the rest of the page is skipped
    exhausted: bool,
}

impl<'a> PageScanner<'a> {
    fn new(doc: &'a Document, page_number: u32) -> Self {
        PageScanner {
            doc,
            page_number,
            images: Vec::new(),
            index: HashMap::new(),
            form_stack: Vec::new(),
            forms: HashMap::new(),
            form_visits: 0,
            placements: 0,
            exhausted: false,
        }
    }

    fn scan(mut self, page_id: ObjectId) -> PageImages {
        debug!(page = self.page_number, "scanning page");

        let page_dict = match self.doc.get_object(page_id) {
            Ok(Object::Dictionary(d)) => Some(d),
            _ => {
                warn!(page = self.page_number, "page object is not a dictionary");
                None
            }
        };

        if let Some(page_dict) = page_dict {
            let resources = page_resources(self.doc, page_dict);
            if let Ok(contents) = page_dict.get(b"Contents") {
                let content = self.content_data(contents);
                let operations = self.parse_content(&content);
                self.scan_operations(&operations, resources, Matrix::identity());
            }
            self.log_undrawn(resources);
        }

        for image in &mut self.images {
            // An image only ever drawn at zero size keeps one placement so
            // it is still reported, with unknown DPI
            if image.placements.iter().any(Placement::is_drawable) {
                image.placements.retain(Placement::is_drawable);
            } else {
                image.placements.truncate(1);
            }

            let count = image.placements.len();
            for (i, placement) in image.placements.iter_mut().enumerate() {
                placement.index = i + 1;
                placement.count = count;
            }
        }

        PageImages {
            page_number: self.page_number,
            images: self.images,
        }
    }

    fn resolve(&self, obj: &'a Object) -> Option<&'a Object> {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).ok(),
            _ => Some(obj),
        }
    }

    /// Content data from a Contents entry (stream, reference or array)
    fn content_data(&self, contents: &'a Object) -> Vec<u8> {
        match self.resolve(contents) {
            Some(Object::Stream(stream)) => decompress_stream(stream),
            Some(Object::Array(arr)) => {
                let mut combined = Vec::new();
                for item in arr {
                    combined.extend(self.content_data(item));
                    combined.push(b'\n');
                }
                combined
            }
            _ => Vec::new(),
        }
    }

    fn xobjects(&self, resources: Option<&'a Dictionary>) -> HashMap<Vec<u8>, ObjectId> {
        let mut result = HashMap::new();
        let xobj_dict = resources
            .and_then(|res| res.get(b"XObject").ok())
            .and_then(|x| self.resolve(x));

        if let Some(Object::Dictionary(xobj_dict)) = xobj_dict {
            for (name, value) in xobj_dict.iter() {
                if let Object::Reference(obj_id) = value {
                    result.insert(name.clone(), *obj_id);
                }
            }
        }
        result
    }

    fn parse_content(&self, content: &[u8]) -> Vec<Operation> {
        if content.iter().all(u8::is_ascii_whitespace) {
            return Vec::new();
        }

        match Content::decode(content) {
            Ok(c) => c.operations,
            Err(e) => {
                warn!(
                    page = self.page_number,
                    "could not parse content stream, its placements are skipped: {}", e
                );
                Vec::new()
            }
        }
    }

    fn scan_operations(
        &mut self,
        operations: &[Operation],
        resources: Option<&'a Dictionary>,
        ctm: Matrix,
    ) {
        if operations.is_empty() {
            return;
        }

        let xobjects = self.xobjects(resources);
        let mut ctm_stack: Vec<Matrix> = vec![ctm];

        for op in operations {
            if self.exhausted {
                return;
            }
            match op.operator.as_str() {
                "q" => {
                    let current = ctm_stack.last().copied().unwrap_or(ctm);
                    ctm_stack.push(current);
                }
                "Q" => {
                    if ctm_stack.len() > 1 {
                        ctm_stack.pop();
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_from_operands(&op.operands) {
                        if let Some(current) = ctm_stack.last_mut() {
                            *current = m.multiply(current);
                        }
                    }
                }
                "Do" => {
                    let name = match op.operands.first() {
                        Some(Object::Name(name)) => name,
                        _ => continue,
                    };
                    let current = ctm_stack.last().copied().unwrap_or(ctm);
                    match xobjects.get(name) {
                        Some(&obj_id) => self.draw_xobject(obj_id, resources, current),
                        None => debug!(
                            page = self.page_number,
                            "Do of unknown XObject /{}",
                            String::from_utf8_lossy(name)
                        ),
                    }
                }
                _ => {}
            }
        }
    }

    fn draw_xobject(&mut self, obj_id: ObjectId, parent_resources: Option<&'a Dictionary>, ctm: Matrix) {
        let stream = match self.doc.get_object(obj_id) {
            Ok(Object::Stream(s)) => s,
            _ => return,
        };

        if is_image_xobject(&stream.dict) {
            self.record(obj_id, Placement::from_ctm(self.page_number, &ctm));
        } else if matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Form") {
            self.scan_form(obj_id, stream, parent_resources, ctm);
        }
    }

    fn scan_form(
        &mut self,
        form_id: ObjectId,
        stream: &'a Stream,
        parent_resources: Option<&'a Dictionary>,
        ctm: Matrix,
    ) {
        if self.form_stack.contains(&form_id) {
            warn!(page = self.page_number, ?form_id, "form XObject draws itself, skipping");
            return;
        }
        if self.form_stack.len() >= MAX_FORM_DEPTH {
            warn!(page = self.page_number, ?form_id, "form XObjects nested too deeply, skipping");
            return;
        }
        self.form_visits += 1;
        if self.form_visits > MAX_FORM_VISITS {
            self.exhaust("too many form XObject draws");
            return;
        }

        let form_matrix = matrix_from_dict(&stream.dict);
        let combined = form_matrix.multiply(&ctm);

        // Forms without their own resources use the ones they were drawn with
        let resources = match stream.dict.get(b"Resources").ok().and_then(|r| self.resolve(r)) {
            Some(Object::Dictionary(d)) => Some(d),
            _ => parent_resources,
        };

        let operations = match self.forms.get(&form_id).cloned() {
            Some(ops) => ops,
            None => {
                let ops = Rc::new(self.parse_content(&decompress_stream(stream)));
                self.forms.insert(form_id, Rc::clone(&ops));
                ops
            }
        };

        self.form_stack.push(form_id);
        self.scan_operations(&operations, resources, combined);
        self.form_stack.pop();
    }

    /// Stop walking the page, keeping what was recorded so far.
    fn exhaust(&mut self, reason: &str) {
        if !self.exhausted {
            warn!(
                page = self.page_number,
                placements = self.placements,
                "{}, ignoring the rest of the page",
                reason
            );
            self.exhausted = true;
        }
    }

    fn record(&mut self, id: ObjectId, placement: Placement) {
        if self.placements >= MAX_PLACEMENTS_PER_PAGE {
            self.exhaust("too many image placements");
            return;
        }
        self.placements += 1;

        if !placement.is_drawable() {
            warn!(
                page = self.page_number,
                ?id,
                "placement has degenerate size {:.3}x{:.3} pt",
                placement.width_pt,
                placement.height_pt
            );
        }

        let slot = match self.index.get(&id).copied() {
            Some(slot) => slot,
            None => {
                self.images.push(DrawnImage {
                    id,
                    placements: Vec::new(),
                });
                self.index.insert(id, self.images.len() - 1);
                self.images.len() - 1
            }
        };
        self.images[slot].placements.push(placement);
    }

    fn log_undrawn(&self, resources: Option<&'a Dictionary>) {
        let mut referenced = Vec::new();
        let mut seen = HashSet::new();
        for (_, obj_id) in self.xobjects(resources) {
            collect_images_recursive(self.doc, obj_id, &mut referenced, &mut seen);
        }
        for id in referenced {
            if !self.index.contains_key(&id) {
                debug!(page = self.page_number, ?id, "image referenced but never drawn, skipping");
            }
        }
    }
}

/// Resources for a page, inherited through `/Parent` if needed
fn page_resources<'a>(doc: &'a Document, page_dict: &'a Dictionary) -> Option<&'a Dictionary> {
    let mut current = page_dict;
    for _ in 0..MAX_PARENT_DEPTH {
        if let Ok(resources) = current.get(b"Resources") {
            return match resources {
                Object::Dictionary(d) => Some(d),
                Object::Reference(id) => doc.get_dictionary(*id).ok(),
                _ => None,
            };
        }
        current = match current.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => doc.get_dictionary(*parent_id).ok()?,
            _ => return None,
        };
    }
    None
}

/// Recursively collect images reachable from an XObject (handles Form XObjects)
fn collect_images_recursive(
    doc: &Document,
    obj_id: ObjectId,
    images: &mut Vec<ObjectId>,
    seen: &mut HashSet<ObjectId>,
) {
    if !seen.insert(obj_id) {
        return;
    }

    let stream = match doc.get_object(obj_id) {
        Ok(Object::Stream(s)) => s,
        _ => return,
    };

    if is_image_xobject(&stream.dict) {
        images.push(obj_id);
        return;
    }

    let xobjects = stream
        .dict
        .get(b"Resources")
        .ok()
        .and_then(|r| match r {
            Object::Reference(id) => doc.get_dictionary(*id).ok(),
            Object::Dictionary(d) => Some(d),
            _ => None,
        })
        .and_then(|res| res.get(b"XObject").ok())
        .and_then(|x| match x {
            Object::Reference(id) => doc.get_dictionary(*id).ok(),
            Object::Dictionary(d) => Some(d),
            _ => None,
        });

    if let Some(xobjects) = xobjects {
        for (_, value) in xobjects.iter() {
            if let Object::Reference(child_id) = value {
                collect_images_recursive(doc, *child_id, images, seen);
            }
        }
    }
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(n) => Some(*n as f64),
        Object::Real(n) => Some(f64::from(*n)),
        _ => None,
    }
}

fn matrix_from_operands(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    Some(Matrix {
        a: number(&operands[0])?,
        b: number(&operands[1])?,
        c: number(&operands[2])?,
        d: number(&operands[3])?,
        e: number(&operands[4])?,
        f: number(&operands[5])?,
    })
}

/// Parse a transformation matrix from a dictionary's /Matrix entry
fn matrix_from_dict(dict: &Dictionary) -> Matrix {
    match dict.get(b"Matrix") {
        Ok(Object::Array(arr)) => matrix_from_operands(arr).unwrap_or_else(Matrix::identity),
        _ => Matrix::identity(),
    }
}

/// Decompress a content stream. Unsupported filters leave the data as-is.
fn decompress_stream(stream: &Stream) -> Vec<u8> {
    let filters: Vec<Vec<u8>> = match stream.dict.get(b"Filter") {
        Ok(Object::Name(n)) => vec![n.clone()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|f| match f {
                Object::Name(n) => Some(n.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    let mut data = stream.content.clone();
    for filter in filters {
        if filter != b"FlateDecode" && filter != b"Fl" {
            debug!(
                "unsupported content stream filter /{}",
                String::from_utf8_lossy(&filter)
            );
            return data;
        }
        let mut decoder = ZlibDecoder::new(&data[..]);
        let mut decoded = Vec::new();
        if let Err(e) = decoder.read_to_end(&mut decoded) {
            warn!("could not inflate content stream: {}", e);
            return stream.content.clone();
        }
        data = decoded;
    }
    data
}
