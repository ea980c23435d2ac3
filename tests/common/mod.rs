//! Helpers for building small PDFs in memory.

#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

pub struct PdfBuilder {
    pub doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        PdfBuilder {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    /// Image XObject with a dummy payload
    pub fn add_image(&mut self, width: i64, height: i64, color_space: &str) -> ObjectId {
        self.add_image_stream(image_stream(width, height, color_space, vec![0u8; 16]))
    }

    pub fn add_image_stream(&mut self, stream: Stream) -> ObjectId {
        self.doc.add_object(Object::Stream(stream))
    }

    /// Form XObject drawing the given operations
    pub fn add_form(
        &mut self,
        ops: Vec<Operation>,
        xobjects: Vec<(&str, ObjectId)>,
        matrix: Option<[i64; 6]>,
    ) -> ObjectId {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 1000.into(), 1000.into()],
            "Resources" => dictionary! { "XObject" => xobject_dict(xobjects) },
        };
        if let Some(m) = matrix {
            dict.set("Matrix", m.iter().map(|&v| Object::Integer(v)).collect::<Vec<_>>());
        }
        let content = Content { operations: ops }.encode().expect("encode form content");
        self.doc.add_object(Stream::new(dict, content))
    }

    pub fn add_page(&mut self, ops: Vec<Operation>, xobjects: Vec<(&str, ObjectId)>) {
        let content = Content { operations: ops }.encode().expect("encode page content");
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));
        let resources_id = self.doc.add_object(dictionary! {
            "XObject" => xobject_dict(xobjects),
        });
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        self.kids.push(page_id.into());
    }

    pub fn build(mut self) -> Vec<u8> {
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids.clone(),
            "Count" => self.kids.len() as i64,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes).expect("save PDF");
        bytes
    }
}

pub fn image_stream(width: i64, height: i64, color_space: &str, content: Vec<u8>) -> Stream {
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width,
        "Height" => height,
        "ColorSpace" => Object::Name(color_space.as_bytes().to_vec()),
        "BitsPerComponent" => 8,
    };
    Stream::new(dict, content)
}

fn xobject_dict(xobjects: Vec<(&str, ObjectId)>) -> Dictionary {
    let mut dict = Dictionary::new();
    for (name, id) in xobjects {
        dict.set(name.as_bytes(), Object::Reference(id));
    }
    dict
}

/// `q w 0 0 h x y cm /name Do Q`
pub fn draw(name: &str, x: i64, y: i64, w: i64, h: i64) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![w.into(), 0.into(), 0.into(), h.into(), x.into(), y.into()],
        ),
        Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
    ]
}
