//! Small tree-editing helpers over `scraper`'s `ego_tree`.
//!
//! `scraper` exposes a read-mostly API; attributes cannot be edited in
//! place. An edit here rebuilds the element from an [`AttrList`] and swaps
//! it into the node, which keeps the node id (and so every id collected
//! from an earlier selection) valid.

use ego_tree::{NodeId, NodeRef, Tree};
use html5ever::tendril::StrTendril;
use html5ever::{Attribute, LocalName, QualName, ns};
use scraper::Node;
use scraper::node::Element;

/// Attributes of one element, in the order the element stores them.
///
/// Names keep their prefix and namespace so foreign attributes such as
/// `xlink:href` survive a rebuild. Lookups by plain name only see
/// attributes in no namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrList(Vec<(QualName, String)>);

fn plain(name: &str) -> QualName {
    QualName::new(None, ns!(), LocalName::from(name))
}

impl AttrList {
    pub fn from_element(element: &Element) -> Self {
        Self(
            element
                .attrs
                .iter()
                .map(|(name, value)| (name.clone(), value.to_string()))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let name = plain(name);
        self.0
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set `name`, replacing in place if present so the order stays stable.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.set_qualified(plain(name), value.into());
    }

    fn set_qualified(&mut self, name: QualName, value: String) {
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value,
            None => self.0.push((name, value)),
        }
    }

    /// Add class tokens that are not already present.
    pub fn add_classes<'a>(&mut self, classes: impl IntoIterator<Item = &'a str>) {
        let mut tokens: Vec<String> = self
            .get("class")
            .map(|c| c.split_ascii_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let before = tokens.len();
        for class in classes {
            if !tokens.iter().any(|t| t == class) {
                tokens.push(class.to_string());
            }
        }
        if tokens.len() != before {
            self.set("class", tokens.join(" "));
        }
    }

    /// Merge a removed wrapper's attributes onto this element.
    ///
    /// The wrapper's value wins on conflict, except for `class`, where the
    /// tokens of both are kept (element first).
    pub fn merge_wrapper(&mut self, wrapper: &AttrList) {
        let class = plain("class");
        for (name, value) in &wrapper.0 {
            if *name == class {
                self.add_classes(value.split_ascii_whitespace());
            } else {
                self.set_qualified(name.clone(), value.clone());
            }
        }
    }

    fn into_attributes(self) -> Vec<Attribute> {
        self.0
            .into_iter()
            .map(|(name, value)| Attribute {
                name,
                value: StrTendril::from(value),
            })
            .collect()
    }
}

pub fn element(tree: &Tree<Node>, id: NodeId) -> Option<&Element> {
    tree.get(id)?.value().as_element()
}

pub fn is_tag(node: NodeRef<'_, Node>, tag: &str) -> bool {
    node.value().as_element().is_some_and(|e| e.name() == tag)
}

/// The only element child of `node`, if every other child is a comment
/// or whitespace-only text.
pub fn sole_element_child(node: NodeRef<'_, Node>) -> Option<NodeId> {
    let mut found = None;
    for child in node.children() {
        match child.value() {
            Node::Element(_) => {
                if found.is_some() {
                    return None;
                }
                found = Some(child.id());
            }
            Node::Text(text) if text.trim().is_empty() => {}
            Node::Comment(_) => {}
            _ => return None,
        }
    }
    found
}

/// Whether `id`'s parent is a `<tag>` whose sole content is `id`.
/// Returns the parent's id.
pub fn sole_content_of(tree: &Tree<Node>, id: NodeId, tag: &str) -> Option<NodeId> {
    let parent = tree.get(id)?.parent()?;
    (is_tag(parent, tag) && sole_element_child(parent) == Some(id)).then(|| parent.id())
}

/// Rewrite the attributes of element `id`. Returns whether anything changed.
pub fn edit_attrs(tree: &mut Tree<Node>, id: NodeId, edit: impl FnOnce(&mut AttrList)) -> bool {
    let Some(current) = element(tree, id) else {
        return false;
    };
    let name = current.name.clone();
    let before = AttrList::from_element(current);
    let mut after = before.clone();
    edit(&mut after);
    if after == before {
        return false;
    }

    let rebuilt = Element::new(name, after.into_attributes());
    match tree.get_mut(id) {
        Some(mut node) => {
            *node.value() = Node::Element(rebuilt);
            true
        }
        None => false,
    }
}

/// Put `child` where `wrapper` is and drop the wrapper (with whatever
/// whitespace it still holds).
pub fn replace_with_child(tree: &mut Tree<Node>, wrapper: NodeId, child: NodeId) -> bool {
    let Some(mut node) = tree.get_mut(wrapper) else {
        return false;
    };
    if node.parent().is_none() {
        return false;
    }
    node.insert_id_before(child);
    node.detach();
    true
}
