//! Annotated tag object
//!
//! Tags point at another object (usually a commit) and carry a name, the
//! tagger's identity, and a message. Lightweight tags are plain refs and
//! never reach this codec; annotated tags participate in revision peeling
//! (`v1.0^{commit}` peels through the tag to its target).
//!
//! ## Format
//!
//! ```text
//! tag <size>\0
//! object <target-digest>
//! type <target-type>
//! tag <name>
//! tagger <name> <email> <timestamp> <timezone>
//!
//! <message>
//! ```

use crate::artifacts::objects::commit::Author;
use crate::artifacts::objects::object::Unpackable;
use crate::artifacts::objects::object::{Object, Packable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use std::io::{BufRead, Write};

/// Annotated tag object
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Tag {
    /// Object the tag points at
    target: ObjectId,
    /// Type of the target object
    target_type: ObjectType,
    /// Tag name as recorded in the object
    name: String,
    /// Who created the tag
    tagger: Author,
    /// Tag message
    message: String,
}

impl Tag {
    pub fn new(
        target: ObjectId,
        target_type: ObjectType,
        name: String,
        tagger: Author,
        message: String,
    ) -> Self {
        Tag {
            target,
            target_type,
            name,
            tagger,
            message,
        }
    }

    pub fn target(&self) -> &ObjectId {
        &self.target
    }

    pub fn target_type(&self) -> ObjectType {
        self.target_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tagger(&self) -> &Author {
        &self.tagger
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Packable for Tag {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut object_content = vec![];

        object_content.push(format!("object {}", self.target.as_ref()));
        object_content.push(format!("type {}", self.target_type.as_str()));
        object_content.push(format!("tag {}", self.name));
        object_content.push(format!("tagger {}", self.tagger.display()));
        object_content.push(String::new());
        object_content.push(self.message.to_string());

        let object_content = object_content.join("\n");
        let content_bytes = object_content.as_bytes();

        let mut tag_bytes = Vec::new();
        let header = format!("{} {}\0", self.object_type().as_str(), content_bytes.len());
        tag_bytes.write_all(header.as_bytes())?;
        tag_bytes.write_all(content_bytes)?;

        Ok(Bytes::from(tag_bytes))
    }
}

impl Unpackable for Tag {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let content = reader
            .bytes()
            .collect::<Result<Vec<u8>, std::io::Error>>()?;

        let content = String::from_utf8(content)?;
        let mut lines = content.lines();

        let target = lines
            .next()
            .and_then(|line| line.strip_prefix("object "))
            .context("Invalid tag object: missing object line")?;
        let target = ObjectId::try_parse(target.to_string())?;

        let target_type = lines
            .next()
            .and_then(|line| line.strip_prefix("type "))
            .context("Invalid tag object: missing type line")?;
        let target_type = ObjectType::try_from(target_type)?;

        let name = lines
            .next()
            .and_then(|line| line.strip_prefix("tag "))
            .context("Invalid tag object: missing tag line")?
            .to_string();

        let tagger = lines
            .next()
            .and_then(|line| line.strip_prefix("tagger "))
            .context("Invalid tag object: missing tagger line")?;
        let tagger = Author::try_from(tagger)?;

        // skip the empty line
        lines.next();

        let message = lines.collect::<Vec<&str>>().join("\n");
        Ok(Self::new(target, target_type, name, tagger, message))
    }
}

impl Object for Tag {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tag
    }

    fn display(&self) -> String {
        format!(
            "object {}\ntype {}\ntag {}\ntagger {}\n\n{}",
            self.target.as_ref(),
            self.target_type.as_str(),
            self.name,
            self.tagger.display(),
            self.message
        )
    }
}
