use folio::{
    content::{Node, Path},
    patch::{Op, Patch, PatchError, apply, diff},
};

use crate::helpers::{essay, essay_edited, essay_with, paragraph};

fn assert_round_trip(before: &Node, after: &Node) -> Patch {
    let patch = diff(before, after);
    let applied = apply(before, &patch).expect("diff output must apply to its source");
    assert_eq!(&applied, after, "patch: {}", patch.to_canonical_json());
    patch
}

#[test]
fn test_diff_of_identical_documents_is_empty() {
    let doc = essay(20);
    assert!(diff(&doc, &doc).is_empty());
    assert!(diff(&Node::Null, &Node::Null).is_empty());
}

#[test]
fn test_single_paragraph_edit_is_one_replace() {
    let before = essay(30);
    let after = essay_edited(30, 12, "Chlorophyll absorbs mostly red and blue light.");
    let patch = assert_round_trip(&before, &after);

    assert_eq!(patch.len(), 1);
    assert_eq!(
        patch.ops()[0],
        Op::Replace {
            path: Path::root().key("blocks").index(12).key("text"),
            value: Node::from("Chlorophyll absorbs mostly red and blue light."),
        }
    );
}

#[test]
fn test_editor_style_edits_round_trip() {
    let before = essay(8);

    // Paragraph moved down two places.
    let mut blocks: Vec<Node> = (0..8).map(paragraph).collect();
    let moved = blocks.remove(1);
    blocks.insert(3, moved);
    assert_round_trip(&before, &essay_with(blocks));

    // Bold mark added to one paragraph, title changed, two paragraphs deleted.
    let mut blocks: Vec<Node> = (0..8).map(paragraph).collect();
    blocks[0] = Node::map([
        ("type", Node::from("paragraph")),
        ("text", Node::from("Paragraph 0 explains how chloroplasts turn light into sugar.")),
        ("marks", Node::list(vec![Node::map([("type", Node::from("bold"))])])),
    ]);
    blocks.drain(5..7);
    let after = Node::map([
        ("title", Node::from("Photosynthesis, revised")),
        ("blocks", Node::list(blocks)),
    ]);
    assert_round_trip(&before, &after);

    // Everything cleared.
    assert_round_trip(&before, &Node::empty_map());
    assert_round_trip(&Node::empty_map(), &before);
}

#[test]
fn test_inserting_blocks_adds_in_order() {
    let before = essay(3);
    let mut blocks: Vec<Node> = (0..3).map(paragraph).collect();
    blocks.insert(1, Node::from("new one"));
    blocks.insert(2, Node::from("new two"));
    let patch = assert_round_trip(&before, &essay_with(blocks));

    let names: Vec<_> = patch.ops().iter().map(Op::name).collect();
    assert_eq!(names, ["add", "add"]);
    assert_eq!(patch.ops()[0].path(), &Path::root().key("blocks").index(1));
    assert_eq!(patch.ops()[1].path(), &Path::root().key("blocks").index(2));
}

#[test]
fn test_patch_survives_serialization() {
    let before = essay(5);
    let after = essay_edited(5, 2, "Stomata let carbon dioxide in.");
    let patch = diff(&before, &after);

    let json = serde_json::to_string(&patch).unwrap();
    let decoded: Patch = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, patch);
    assert_eq!(apply(&before, &decoded).unwrap(), after);
}

#[test]
fn test_failed_apply_leaves_input_untouched() {
    let doc = essay(2);
    let patch = Patch::from(vec![
        Op::Replace {
            path: Path::root().key("title"),
            value: Node::from("Changed"),
        },
        Op::Remove {
            path: Path::root().key("blocks").index(7),
        },
    ]);

    let err = apply(&doc, &patch).unwrap_err();
    assert!(matches!(err, PatchError::IndexOutOfBounds { op: 1, index: 7, len: 2, .. }));
    assert_eq!(doc, essay(2));

    let folio_err: folio::Error = err.into();
    assert!(folio_err.is_integrity_error());
}

#[test]
fn test_delta_is_much_smaller_than_document() {
    let before = essay(50);
    let after = essay_edited(50, 49, "A short closing sentence.");
    let patch = diff(&before, &after);
    assert!(patch.encoded_len() * 10 < after.encoded_len());
}
