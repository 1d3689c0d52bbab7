pub mod tags;

pub use tags::{parse_template, ParsedTemplate, TemplateNode};
