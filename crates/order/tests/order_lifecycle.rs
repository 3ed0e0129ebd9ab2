//! Integration tests for the order state machine.
//!
//! These run full command sequences through the pure state machine the way
//! the service applies them: one command at a time against the previously
//! committed state.

use common::{CustomerId, OrderId, PaymentId};
use order::domain::{Order, OrderCommand, OrderError, apply, price_of};

fn created() -> Order {
    apply(
        None,
        OrderCommand::Create {
            order_id: OrderId::new(),
            customer_id: CustomerId::new(),
        },
    )
    .unwrap()
}

fn run(start: Order, commands: Vec<OrderCommand>) -> Result<Order, OrderError> {
    let mut order = start;
    for command in commands {
        order = apply(Some(order), command)?;
    }
    Ok(order)
}

fn add(item: &str) -> OrderCommand {
    OrderCommand::AddItem {
        item: item.to_string(),
    }
}

fn remove(item: &str) -> OrderCommand {
    OrderCommand::RemoveItem {
        item: item.to_string(),
    }
}

mod completion {
    use super::*;

    #[test]
    fn single_item_order_completes() {
        let pending = run(created(), vec![add("sku1"), OrderCommand::Process]).unwrap();
        assert!(matches!(pending, Order::Pending { .. }));
        assert_eq!(pending.items(), ["sku1"]);
        assert_eq!(pending.price(), Some("9.99".parse().unwrap()));

        let payment_id = PaymentId::new();
        let completed = run(
            pending,
            vec![
                OrderCommand::ConfirmStock,
                OrderCommand::ConfirmPayment { payment_id },
            ],
        )
        .unwrap();

        assert!(matches!(completed, Order::Completed { .. }));
        assert_eq!(completed.items(), ["sku1"]);
        assert_eq!(completed.price(), Some("9.99".parse().unwrap()));
        assert_eq!(completed.payment_id(), Some(payment_id));
    }

    #[test]
    fn confirmation_order_does_not_matter() {
        let pending = run(created(), vec![add("sku1"), OrderCommand::Process]).unwrap();
        let payment_id = PaymentId::new();

        let stock_first = run(
            pending.clone(),
            vec![
                OrderCommand::ConfirmStock,
                OrderCommand::ConfirmPayment { payment_id },
            ],
        )
        .unwrap();
        let payment_first = run(
            pending,
            vec![
                OrderCommand::ConfirmPayment { payment_id },
                OrderCommand::ConfirmStock,
            ],
        )
        .unwrap();

        assert_eq!(stock_first, payment_first);
    }

    #[test]
    fn completed_price_matches_recomputation() {
        let completed = run(
            created(),
            vec![
                add("sku1"),
                add("sku2"),
                OrderCommand::Process,
                OrderCommand::ConfirmStock,
                OrderCommand::ConfirmPayment {
                    payment_id: PaymentId::new(),
                },
            ],
        )
        .unwrap();

        assert_eq!(completed.price(), Some(price_of(completed.items())));
    }
}

mod cancellation {
    use super::*;

    #[test]
    fn rejection_cancels_regardless_of_interleaving() {
        let pending = run(created(), vec![add("sku1"), OrderCommand::Process]).unwrap();
        let payment_id = PaymentId::new();

        let sequences = vec![
            vec![OrderCommand::RejectPayment],
            vec![OrderCommand::RejectStock],
            vec![OrderCommand::ConfirmStock, OrderCommand::RejectPayment],
            vec![
                OrderCommand::ConfirmPayment { payment_id },
                OrderCommand::RejectStock,
            ],
        ];

        for sequence in sequences {
            let canceled = run(pending.clone(), sequence).unwrap();
            assert!(matches!(canceled, Order::Canceled { .. }));
        }
    }

    #[test]
    fn no_confirmation_leaves_canceled() {
        let canceled = run(
            created(),
            vec![add("sku1"), OrderCommand::Process, OrderCommand::RejectPayment],
        )
        .unwrap();

        assert_eq!(
            apply(
                Some(canceled.clone()),
                OrderCommand::ConfirmPayment {
                    payment_id: PaymentId::new()
                }
            )
            .unwrap_err(),
            OrderError::NotPayable
        );
        assert_eq!(
            apply(Some(canceled), OrderCommand::ConfirmStock).unwrap_err(),
            OrderError::NotStockable
        );
    }
}

mod item_management {
    use super::*;

    #[test]
    fn removing_every_item_reverts_to_empty() {
        let order = run(
            created(),
            vec![add("sku1"), add("sku2"), remove("sku1"), remove("sku2")],
        )
        .unwrap();

        assert!(matches!(order, Order::Empty { .. }));
        assert!(order.items().is_empty());
    }

    #[test]
    fn reverted_order_can_be_refilled_and_processed() {
        let order = run(
            created(),
            vec![
                add("sku1"),
                remove("sku1"),
                add("sku2"),
                OrderCommand::Process,
            ],
        )
        .unwrap();

        assert!(matches!(order, Order::Pending { .. }));
        assert_eq!(order.items(), ["sku2"]);
    }

    #[test]
    fn items_stay_non_empty_outside_empty_state() {
        let sequences = vec![
            vec![add("sku1")],
            vec![add("sku1"), add("sku2"), remove("sku2")],
            vec![add("sku1"), OrderCommand::Process],
            vec![
                add("sku1"),
                OrderCommand::Process,
                OrderCommand::ConfirmStock,
            ],
            vec![
                add("sku1"),
                OrderCommand::Process,
                OrderCommand::RejectStock,
            ],
        ];

        for sequence in sequences {
            let mut order = created();
            for command in sequence {
                order = apply(Some(order), command).unwrap();
                if !matches!(order, Order::Empty { .. }) {
                    assert!(!order.items().is_empty());
                }
            }
        }
    }
}

mod redelivery {
    use super::*;

    #[test]
    fn replayed_commands_reject_instead_of_corrupting() {
        let payment_id = PaymentId::new();
        let completed = run(
            created(),
            vec![
                add("sku1"),
                OrderCommand::Process,
                OrderCommand::ConfirmPayment { payment_id },
                OrderCommand::ConfirmStock,
            ],
        )
        .unwrap();

        let replays = vec![
            OrderCommand::Process,
            OrderCommand::ConfirmPayment { payment_id },
            OrderCommand::ConfirmStock,
            OrderCommand::RejectPayment,
            OrderCommand::RejectStock,
        ];
        for command in replays {
            let before = completed.clone();
            assert!(apply(Some(before), command).is_err());
        }
    }
}
