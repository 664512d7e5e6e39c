// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end token traversal through a live graph.

use blockflow_graph::{
    BlockId, BlockKind, BlockRegistry, BlockTemplate, ConnectionGraph, FlowEvent, InteractionState,
    Session, StraightGeometry, TokenFate, Transform, TraversalEngine,
};

fn place(graph: &mut ConnectionGraph, registry: &BlockRegistry, template: &str, x: f32) -> BlockId {
    let block = registry
        .create_block(template, format!("{template}@{x}"))
        .unwrap()
        .with_position([x, 0.0]);
    graph.add_block(block)
}

fn run(engine: &mut TraversalEngine, graph: &ConnectionGraph, events: &mut Vec<FlowEvent>) {
    for _ in 0..200 {
        if engine.is_empty() {
            return;
        }
        engine.tick(graph, &StraightGeometry, 1.0 / 60.0, events);
    }
    panic!("tokens still in flight");
}

fn visits(events: &[FlowEvent]) -> Vec<(BlockId, f32)> {
    events
        .iter()
        .filter_map(|e| match e {
            FlowEvent::BlockVisited { block, value, .. } => Some((*block, *value)),
            _ => None,
        })
        .collect()
}

#[test]
fn token_visits_chain_in_order() {
    let mut registry = BlockRegistry::with_builtins();
    registry.register(BlockTemplate::new("sub", "Subtract", BlockKind::Operator, Transform::Subtract(3.0)));
    let mut graph = ConnectionGraph::new();
    let input = place(&mut graph, &registry, "input", 0.0);
    let x = place(&mut graph, &registry, "multiply", 100.0);
    let y = place(&mut graph, &registry, "sub", 200.0);
    let output = place(&mut graph, &registry, "output", 300.0);
    graph.connect(input, x).unwrap();
    graph.connect(x, y).unwrap();
    graph.connect(y, output).unwrap();

    let mut engine = TraversalEngine::default();
    let mut events = Vec::new();
    let token = engine.spawn(&graph, &StraightGeometry, input, &mut events).unwrap();
    run(&mut engine, &graph, &mut events);

    // 1 -> 1 * 2 -> 2 - 3 -> identity
    assert_eq!(visits(&events), vec![(x, 2.0), (y, -1.0), (output, -1.0)]);
    assert_eq!(
        events.last(),
        Some(&FlowEvent::TokenDestroyed {
            token,
            fate: TokenFate::Completed { value: -1.0 }
        })
    );
}

#[test]
fn mid_flight_rewire_is_followed() {
    let registry = BlockRegistry::with_builtins();
    let mut graph = ConnectionGraph::new();
    let input = place(&mut graph, &registry, "input", 0.0);
    let x = place(&mut graph, &registry, "add", 300.0);
    let output = place(&mut graph, &registry, "output", 900.0);
    graph.connect(input, x).unwrap();
    let tail = graph.connect(x, output).unwrap();

    let mut engine = TraversalEngine::default();
    let mut events = Vec::new();
    let token = engine.spawn(&graph, &StraightGeometry, input, &mut events).unwrap();
    engine.tick(&graph, &StraightGeometry, 0.1, &mut events);
    assert!(engine.token(token).unwrap().is_moving());
    assert!(visits(&events).is_empty());

    // Splice a multiply block ahead of the token before it reaches x
    let y = place(&mut graph, &registry, "multiply", 600.0);
    graph.insert_into_pipe(y, tail).unwrap();
    run(&mut engine, &graph, &mut events);

    assert_eq!(visits(&events), vec![(x, 2.0), (y, 4.0), (output, 4.0)]);
}

#[test]
fn tokens_move_independently() {
    let registry = BlockRegistry::with_builtins();
    let mut graph = ConnectionGraph::new();
    let input = place(&mut graph, &registry, "input", 0.0);
    let output = place(&mut graph, &registry, "output", 300.0);
    graph.connect(input, output).unwrap();

    let mut engine = TraversalEngine::default();
    let mut events = Vec::new();
    let first = engine.spawn(&graph, &StraightGeometry, input, &mut events).unwrap();
    engine.tick(&graph, &StraightGeometry, 0.25, &mut events);
    let second = engine.spawn(&graph, &StraightGeometry, input, &mut events).unwrap();
    assert_eq!(engine.len(), 2);
    assert!(engine.token(first).unwrap().progress > engine.token(second).unwrap().progress);

    run(&mut engine, &graph, &mut events);
    let destroyed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            FlowEvent::TokenDestroyed { token, .. } => Some(*token),
            _ => None,
        })
        .collect();
    assert_eq!(destroyed, vec![first, second]);
}

#[test]
fn session_gesture_scenario() {
    let mut session = Session::default().with_geometry(StraightGeometry);
    let (input, output) = session.bootstrap([0.0, 0.0], [600.0, 0.0]).unwrap();
    let ids = session.stock_palette(&["add", "multiply"]).unwrap();
    let (add, multiply) = (ids[0], ids[1]);

    // add lands on input -> output
    session.interact(add, [200.0, -300.0]).unwrap();
    session.drag_to([200.0, -20.0]);
    session.interact(add, [200.0, 5.0]).unwrap();
    assert_eq!(session.block(add).unwrap().state(), InteractionState::Connected);

    // multiply lands on add -> output
    session.interact(multiply, [400.0, 300.0]).unwrap();
    session.interact(multiply, [400.0, 5.0]).unwrap();
    assert_eq!(session.graph().next_hop(add).map(|(b, _)| b), Some(multiply));
    assert_eq!(session.graph().next_hop(multiply).map(|(b, _)| b), Some(output));

    session.set_value(input, 3.0).unwrap();
    session.drain_events();
    session.trigger_source().unwrap();
    for _ in 0..120 {
        session.tick(1.0 / 60.0);
    }
    assert!(session.engine().is_empty());
    let events = session.drain_events();
    assert_eq!(visits(&events), vec![(add, 4.0), (multiply, 8.0), (output, 8.0)]);

    // Pulling add out heals the chain around it
    session.return_to_palette(add).unwrap();
    assert_eq!(session.graph().next_hop(input).map(|(b, _)| b), Some(multiply));
    assert_eq!(session.palette().len(), 1);
}
