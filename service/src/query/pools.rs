//! [`Query`] collection related to the multiple [`Pool`]s.

use common::operations::By;

use crate::read;
#[cfg(doc)]
use crate::{domain::Pool, Query};

use super::DatabaseQuery;

/// Queries a list of active [`Pool`]s, the most recently created first.
pub type List =
    DatabaseQuery<By<read::pool::list::Page, read::pool::list::Selector>>;

/// Queries total count of active [`Pool`]s.
pub type TotalCount =
    DatabaseQuery<By<read::pool::list::TotalCount, read::pool::list::Filter>>;

#[cfg(test)]
mod spec {
    use uuid::Uuid;

    use crate::{
        domain::{pool, user},
        fixture, read, Query as _,
    };

    use super::{List, TotalCount};

    fn first(n: usize, after: Option<pool::Id>) -> read::pool::list::Selector {
        read::pool::list::Selector {
            arguments: read::pool::list::Arguments::new(
                Some(n),
                after,
                None,
                None,
                n,
            )
            .unwrap(),
            filter: read::pool::list::Filter::default(),
        }
    }

    fn ids(page: &read::pool::list::Page) -> Vec<pool::Id> {
        page.edges.iter().map(|e| e.node).collect()
    }

    #[tokio::test]
    async fn lists_active_pools_newest_first() {
        let (svc, _) = fixture::service();
        let oldest = fixture::pool(&svc, 100).await;
        let completed = fixture::pool(&svc, 100).await;
        let newest = fixture::pool(&svc, 100).await;
        fixture::contribute(&svc, completed.id, 100).await.unwrap();

        let page = svc.execute(List::by(first(10, None))).await.unwrap();

        assert_eq!(ids(&page), [newest.id, oldest.id]);
        assert!(!page.page_info().has_next_page);
    }

    #[tokio::test]
    async fn paginates_pools() {
        let (svc, _) = fixture::service();
        let mut created = Vec::new();
        for _ in 0..5 {
            created.push(fixture::pool(&svc, 100).await.id);
        }
        created.reverse();

        let page = svc.execute(List::by(first(2, None))).await.unwrap();
        assert_eq!(ids(&page), created[..2]);
        assert!(page.page_info().has_next_page);

        let after = page.page_info().end_cursor;
        let page = svc.execute(List::by(first(3, after))).await.unwrap();
        assert_eq!(ids(&page), created[2..]);
        assert!(!page.page_info().has_next_page);
    }

    #[tokio::test]
    async fn filters_pools_by_owner() {
        let (svc, _) = fixture::service();
        let pool = fixture::pool(&svc, 100).await;
        _ = fixture::pool(&svc, 100).await;
        let filter = read::pool::list::Filter {
            owner_id: Some(pool.owner_id),
        };

        let page = svc
            .execute(List::by(read::pool::list::Selector {
                filter,
                ..first(10, None)
            }))
            .await
            .unwrap();
        assert_eq!(ids(&page), [pool.id]);

        let count = svc.execute(TotalCount::by(filter)).await.unwrap();
        assert_eq!(i32::from(count), 1);

        let none = svc
            .execute(TotalCount::by(read::pool::list::Filter {
                owner_id: Some(user::Id::from(Uuid::new_v4())),
            }))
            .await
            .unwrap();
        assert_eq!(i32::from(none), 0);
    }

    #[tokio::test]
    async fn counts_active_pools_only() {
        let (svc, _) = fixture::service();
        let pool = fixture::pool(&svc, 100).await;
        _ = fixture::pool(&svc, 100).await;
        fixture::contribute(&svc, pool.id, 150).await.unwrap();

        let count = svc
            .execute(TotalCount::by(read::pool::list::Filter::default()))
            .await
            .unwrap();

        assert_eq!(i32::from(count), 1);
    }
}
