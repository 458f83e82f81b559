// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end editing sessions on one slide.

use slidekit_sequencer::{
    Effect, MainSequence, Paragraph, PresetLibrary, SequenceRef, SequencerConfig, SlideText, TimerMode,
};
use slidekit_timing::{EffectNodeType, NodeId, ShapeId, Target, TimeValue, TimingTree};
use std::rc::Rc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn session() -> (MainSequence, Rc<SlideText>, PresetLibrary) {
    init_tracing();
    let text = Rc::new(SlideText::new());
    let main = MainSequence::from_tree(TimingTree::new(), text.clone(), SequencerConfig::default());
    (main, text, PresetLibrary::builtin())
}

/// Click groups, with groups and their children
fn layout(main: &MainSequence) -> Vec<Vec<Vec<NodeId>>> {
    let tree = main.tree();
    let root = main.sequence().root().unwrap();
    tree.children(root)
        .iter()
        .map(|click| tree.children(*click).iter().map(|with| tree.children(*with).to_vec()).collect())
        .collect()
}

#[test]
fn test_click_with_click_scenario() {
    let (mut main, _, library) = session();
    let fade = library.get("ooo-entrance-fade-in").unwrap();
    let a = main.append_preset(fade, "", Target::Shape(ShapeId::new()), None).unwrap();
    let b = main.append_preset(fade, "", Target::Shape(ShapeId::new()), None).unwrap();
    let c = main.append_preset(fade, "", Target::Shape(ShapeId::new()), None).unwrap();
    main.update_effect(b, |effect, tree, _| effect.set_node_type(tree, EffectNodeType::WithPrevious));
    assert_eq!(main.pending_timer(), Some(TimerMode::RebuildTree));
    main.flush();

    let node = |id| main.effect(id).unwrap().node();
    assert_eq!(layout(&main), vec![vec![vec![node(a), node(b)]], vec![vec![node(c)]]]);

    // A second rebuild leaves the tree alone
    let before = layout(&main);
    let nodes = main.tree().node_count();
    main.rebuild();
    main.flush();
    assert_eq!(layout(&main), before);
    assert_eq!(main.tree().node_count(), nodes);
}

#[test]
fn test_text_group_scenario() {
    let (mut main, text, library) = session();
    let shape = ShapeId::new();
    text.set_paragraphs(
        shape,
        vec![Paragraph::new("Agenda"), Paragraph::with_level("Intro", 1), Paragraph::with_level("Demo", 1)],
    );
    let appear = library.get("ooo-entrance-appear").unwrap();
    let id = main.append_preset(appear, "", Target::Shape(shape), None).unwrap();

    let group = main.create_text_group(id, Some(1), None, false, false).unwrap();
    main.flush();

    let types: Vec<Option<EffectNodeType>> = main.sequence().effects().map(Effect::node_type).collect();
    assert_eq!(
        types,
        vec![Some(EffectNodeType::OnClick), Some(EffectNodeType::WithPrevious), Some(EffectNodeType::WithPrevious)]
    );
    assert_eq!(layout(&main).len(), 1);

    // Ungrouping leaves only the original effect
    main.set_text_grouping(SequenceRef::Main, group, None);
    main.flush();
    assert_eq!(main.count(), 1);
    assert_eq!(main.effect_from_offset(0).map(Effect::id), Some(id));
}

#[test]
fn test_paragraph_deletion_shifts_effects() {
    let (mut main, text, library) = session();
    let shape = ShapeId::new();
    text.set_text(shape, "One\nTwo\nThree\nFour");
    let appear = library.get("ooo-entrance-appear").unwrap();
    let ids: Vec<_> = (0..4)
        .map(|p| main.append_preset(appear, "", Target::paragraph(shape, p), None).unwrap())
        .collect();

    main.dispose_text_range(Target::paragraph(shape, 1));
    text.remove_paragraph(shape, 1);
    main.flush();

    assert!(main.effect(ids[1]).is_none());
    let paragraphs: Vec<u32> = [ids[0], ids[2], ids[3]]
        .iter()
        .map(|id| main.effect(*id).unwrap().target().unwrap().as_paragraph().unwrap().paragraph)
        .collect();
    assert_eq!(paragraphs, vec![0, 1, 2]);
}

#[test]
fn test_hide_after_animation_on_next_click() {
    let (mut main, _, library) = session();
    let fade = library.get("ooo-entrance-fade-in").unwrap();
    let id = main.append_preset(fade, "", Target::Shape(ShapeId::new()), None).unwrap();
    main.update_effect(id, |effect, _, _| {
        effect.set_has_after_effect(true);
        effect.set_after_effect_on_next(true);
    });
    main.flush();

    let groups = layout(&main);
    assert_eq!(groups.len(), 2);
    let hide = main.tree().node(groups[1][0][0]).unwrap();
    assert_eq!(hide.user_data.master_element, Some(main.effect(id).unwrap().node()));
    assert_eq!(hide.timing.begin, Some(TimeValue::Seconds(0.0)));

    // Reparsing restores the setting
    let tree = main.into_tree();
    let parsed = MainSequence::from_tree(tree, Rc::new(SlideText::new()), SequencerConfig::default());
    let effect = parsed.effect_from_offset(0).unwrap();
    assert!(effect.has_after_effect());
    assert!(effect.after_effect_on_next());
}

#[test]
fn test_interactive_trigger_round_trip() {
    let (mut main, _, library) = session();
    let button = ShapeId::new();
    let spin = library.get("ooo-emphasis-spin").unwrap();
    let id = main.append_preset(spin, "", Target::Shape(ShapeId::new()), None).unwrap();
    assert!(main.set_trigger(id, Some(button)));
    main.flush();

    let tree = main.into_tree();
    let parsed = MainSequence::from_tree(tree, Rc::new(SlideText::new()), SequencerConfig::default());
    assert_eq!(parsed.count(), 0);
    assert_eq!(parsed.total_count(), 1);
    assert_eq!(parsed.sequence_of(id), None);
    assert!(parsed.has_effect(button));
    assert_eq!(parsed.interactive_sequences()[0].trigger_shape(), Some(button));
}
