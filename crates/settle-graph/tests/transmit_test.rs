//! Integration tests for BondGraph::transmit.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use settle_graph::{BondGraph, FixedDelay, GraphError, Strength};

#[tokio::test(start_paused = true)]
async fn test_transmit_waits_resistance_delay() {
  let graph = BondGraph::new();
  let bond = graph.connect("A", "B", Strength::Weak);

  let result = graph
    .transmit(&bond.bond_id, &json!({ "amount": 5 }))
    .await
    .expect("transmit failed");

  assert_eq!(result.delay_ms, 100);
  assert_eq!(result.strength, Strength::Weak);
  assert_eq!(graph.bond(&bond.bond_id).unwrap().transmission_count, 1);
  assert_eq!(graph.stats().total_transmissions, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stronger_bonds_transmit_faster() {
  let graph = BondGraph::new();
  let bond = graph.connect("A", "B", Strength::Weak);
  graph.strengthen(&bond.bond_id).unwrap();
  graph.strengthen(&bond.bond_id).unwrap();

  let result = graph.transmit(&bond.bond_id, &json!({})).await.unwrap();

  assert_eq!(result.delay_ms, 10);
  assert_eq!(result.strength, Strength::Strong);
}

#[tokio::test(start_paused = true)]
async fn test_transmit_rejects_broken_and_unknown() {
  let graph = BondGraph::new();
  let bond = graph.connect("A", "B", Strength::Weak);
  graph.break_bond(&bond.bond_id).unwrap();

  let broken = graph.transmit(&bond.bond_id, &json!({})).await;
  assert_eq!(broken, Err(GraphError::NotActive(bond.bond_id.clone())));

  let missing = graph.transmit("nope", &json!({})).await;
  assert_eq!(missing, Err(GraphError::NotFound("nope".to_string())));

  assert_eq!(graph.bond(&bond.bond_id).unwrap().transmission_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_injected_delay_policy() {
  let graph = BondGraph::with_delay(Arc::new(FixedDelay(Duration::from_millis(7))));
  let bond = graph.connect("A", "B", Strength::Weak);

  let result = graph.transmit(&bond.bond_id, &json!({})).await.unwrap();

  assert_eq!(result.delay_ms, 7);
}

#[tokio::test(start_paused = true)]
async fn test_transmit_completes_even_if_broken_in_flight() {
  let graph = Arc::new(BondGraph::new());
  let bond = graph.connect("A", "B", Strength::Weak);

  let in_flight = {
    let graph = graph.clone();
    let bond_id = bond.bond_id.clone();
    tokio::spawn(async move { graph.transmit(&bond_id, &json!({})).await })
  };

  tokio::time::sleep(Duration::from_millis(10)).await;
  graph.break_bond(&bond.bond_id).unwrap();

  let result = in_flight.await.unwrap();
  assert!(result.is_ok());
  assert_eq!(graph.bond(&bond.bond_id).unwrap().transmission_count, 1);
}
