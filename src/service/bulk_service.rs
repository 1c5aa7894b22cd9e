// service/bulk_service.rs
use std::collections::HashSet;

use uuid::Uuid;

use crate::{
    dtos::ticketdtos::{
        BulkAssignDto, BulkDeleteDto, BulkPriorityDto, BulkStatusDto, BulkTransferDto, ChangeStatusDto,
        TransferTicketDto, UpdateTicketDto,
    },
    models::usermodel::Actor,
    service::{
        error::ServiceError,
        outcome::{Outcome, SideEffects},
        ticket_service::TicketService,
    },
};

/// Applies one lifecycle operation to many tickets. Malformed ids, unknown
/// tickets and per-ticket failures are skipped; the outcome carries the
/// number of tickets actually changed.
#[derive(Clone)]
pub struct BulkService {
    tickets: TicketService,
}

/// Parses the requested ids, dropping malformed ones and repeats.
fn parse_ids(raw: &[String]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    raw.iter()
        .filter_map(|id| Uuid::parse_str(id.trim()).ok())
        .filter(|id| seen.insert(*id))
        .collect()
}

fn ensure_agent(actor: &Actor) -> Result<(), ServiceError> {
    if actor.is_agent() {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(actor.user_id.clone()))
    }
}

#[derive(Default)]
struct Tally {
    changed: usize,
    effects: SideEffects,
}

impl Tally {
    fn record<T>(&mut self, result: Result<Outcome<T>, ServiceError>) {
        if let Ok(outcome) = result {
            self.changed += 1;
            self.effects.absorb(outcome.side_effects);
        }
    }

    fn finish(self) -> Outcome<usize> {
        self.effects.finish(self.changed)
    }
}

impl BulkService {
    pub fn new(tickets: TicketService) -> Self {
        Self { tickets }
    }

    pub async fn bulk_assign(&self, actor: &Actor, body: BulkAssignDto) -> Result<Outcome<usize>, ServiceError> {
        ensure_agent(actor)?;
        let mut tally = Tally::default();
        for id in parse_ids(&body.ticket_ids) {
            tally.record(self.tickets.assign_ticket(actor, id, &body.agent_id).await);
        }
        Ok(tally.finish())
    }

    pub async fn bulk_update_status(&self, actor: &Actor, body: BulkStatusDto) -> Result<Outcome<usize>, ServiceError> {
        ensure_agent(actor)?;
        let mut tally = Tally::default();
        for id in parse_ids(&body.ticket_ids) {
            let change = ChangeStatusDto {
                status: body.status,
                comment: None,
            };
            tally.record(self.tickets.change_status(actor, id, change).await);
        }
        Ok(tally.finish())
    }

    pub async fn bulk_update_priority(
        &self,
        actor: &Actor,
        body: BulkPriorityDto,
    ) -> Result<Outcome<usize>, ServiceError> {
        ensure_agent(actor)?;
        let mut tally = Tally::default();
        for id in parse_ids(&body.ticket_ids) {
            let patch = UpdateTicketDto {
                priority: Some(body.priority),
                ..Default::default()
            };
            tally.record(self.tickets.update_ticket(actor, id, patch).await);
        }
        Ok(tally.finish())
    }

    pub async fn bulk_transfer(&self, actor: &Actor, body: BulkTransferDto) -> Result<Outcome<usize>, ServiceError> {
        ensure_agent(actor)?;
        let mut tally = Tally::default();
        for id in parse_ids(&body.ticket_ids) {
            let transfer = TransferTicketDto {
                department_id: body.department_id,
                agent_id: None,
            };
            tally.record(self.tickets.transfer_ticket(actor, id, transfer).await);
        }
        Ok(tally.finish())
    }

    pub async fn bulk_delete(&self, actor: &Actor, body: BulkDeleteDto) -> Result<Outcome<usize>, ServiceError> {
        ensure_agent(actor)?;
        let mut tally = Tally::default();
        for id in parse_ids(&body.ticket_ids) {
            tally.record(self.tickets.delete_ticket(actor, id).await);
        }
        Ok(tally.finish())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        db::{memory::MemoryStore, ticketdb::TicketExt},
        models::ticketmodel::{TicketPriority, TicketStatus},
        service::test_support::*,
    };

    async fn seeded(store: &Arc<MemoryStore>, count: usize) -> (BulkService, Vec<String>) {
        let engine = engine_with(store.clone(), false);
        let mut ids = Vec::new();
        for i in 0..count {
            let ticket = engine
                .create_ticket(&customer("c1"), new_ticket(&format!("bulk {}", i)))
                .await
                .unwrap()
                .value;
            ids.push(ticket.id.to_string());
        }
        (BulkService::new(engine), ids)
    }

    #[test]
    fn malformed_and_repeated_ids_are_dropped() {
        let id = Uuid::new_v4();
        let raw = vec![id.to_string(), "not-a-uuid".into(), format!(" {} ", id)];
        assert_eq!(parse_ids(&raw), vec![id]);
    }

    #[tokio::test]
    async fn delete_counts_only_valid_ids() {
        let store = Arc::new(MemoryStore::new());
        let (bulk, mut ids) = seeded(&store, 1).await;
        ids.push("garbage".into());

        let outcome = bulk
            .bulk_delete(&staff("a1"), BulkDeleteDto { ticket_ids: ids.clone() })
            .await
            .unwrap();
        assert_eq!(outcome.value, 1);

        let id = Uuid::parse_str(&ids[0]).unwrap();
        assert!(store.get_ticket(TENANT, id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn assign_stops_counting_at_capacity() {
        let store = Arc::new(MemoryStore::new());
        seed_agent(&store, "a1", vec![], 2).await;
        let (bulk, ids) = seeded(&store, 3).await;

        let body = BulkAssignDto {
            ticket_ids: ids,
            agent_id: "a1".into(),
        };
        let outcome = bulk.bulk_assign(&staff("lead"), body).await.unwrap();
        assert_eq!(outcome.value, 2);
        assert_eq!(agent_load(&store, "a1").await, 2);
    }

    #[tokio::test]
    async fn status_and_priority_skip_unknown_tickets() {
        let store = Arc::new(MemoryStore::new());
        let (bulk, mut ids) = seeded(&store, 2).await;
        ids.push(Uuid::new_v4().to_string());

        let body = BulkStatusDto {
            ticket_ids: ids.clone(),
            status: TicketStatus::OnHold,
        };
        assert_eq!(bulk.bulk_update_status(&staff("a1"), body).await.unwrap().value, 2);

        let body = BulkPriorityDto {
            ticket_ids: ids.clone(),
            priority: TicketPriority::Urgent,
        };
        assert_eq!(bulk.bulk_update_priority(&staff("a1"), body).await.unwrap().value, 2);

        let id = Uuid::parse_str(&ids[0]).unwrap();
        let ticket = store.get_ticket(TENANT, id).await.unwrap().unwrap();
        assert_eq!(ticket.status, TicketStatus::OnHold);
        assert_eq!(ticket.priority, TicketPriority::Urgent);
    }

    #[tokio::test]
    async fn other_tenants_tickets_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let (bulk, ids) = seeded(&store, 2).await;
        let dept = seed_department(&store, "Support").await;

        let mut foreign = staff("a9");
        foreign.tenant_id = OTHER_TENANT.to_string();
        let body = BulkTransferDto {
            ticket_ids: ids.clone(),
            department_id: dept.id,
        };
        assert_eq!(bulk.bulk_transfer(&foreign, body).await.unwrap().value, 0);

        let body = BulkTransferDto {
            ticket_ids: ids,
            department_id: dept.id,
        };
        assert_eq!(bulk.bulk_transfer(&staff("a1"), body).await.unwrap().value, 2);
        assert_eq!(department_counts(&store, dept.id).await, (2, 2));
    }

    #[tokio::test]
    async fn customers_cannot_run_bulk_operations() {
        let store = Arc::new(MemoryStore::new());
        let (bulk, ids) = seeded(&store, 1).await;

        let err = bulk
            .bulk_delete(&customer("c1"), BulkDeleteDto { ticket_ids: ids })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }
}
