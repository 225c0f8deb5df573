mod section;

pub use section::{now_millis, Link, Note, Section, SectionInput, UNTITLED};
