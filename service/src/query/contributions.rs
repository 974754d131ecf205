//! [`Query`] collection related to the multiple [`Contribution`]s.

use common::operations::By;

use crate::read;
#[cfg(doc)]
use crate::{domain::Contribution, Query};

use super::DatabaseQuery;

/// Queries a list of [`Contribution`]s made to a single [`Pool`], in the order
/// they were made.
///
/// [`Pool`]: crate::domain::Pool
pub type List = DatabaseQuery<
    By<read::contribution::list::Page, read::contribution::list::Selector>,
>;

#[cfg(test)]
mod spec {
    use crate::{domain::pool, fixture, read, Query as _};

    use super::List;

    fn selector(
        pool_id: pool::Id,
        arguments: read::contribution::list::Arguments,
    ) -> read::contribution::list::Selector {
        read::contribution::list::Selector {
            arguments,
            filter: read::contribution::list::Filter { pool_id },
        }
    }

    #[tokio::test]
    async fn lists_contributions_of_pool_in_order() {
        let (svc, _) = fixture::service();
        let pool = fixture::pool(&svc, 1_000).await;
        let other = fixture::pool(&svc, 1_000).await;
        let mut made = Vec::new();
        for amount in [10, 20, 30] {
            let res = fixture::contribute(&svc, pool.id, amount).await.unwrap();
            made.push(res.contribution.id);
        }
        fixture::contribute(&svc, other.id, 40).await.unwrap();

        let page = svc
            .execute(List::by(selector(
                pool.id,
                read::contribution::list::Arguments::new(
                    Some(10),
                    None,
                    None,
                    None,
                    10,
                )
                .unwrap(),
            )))
            .await
            .unwrap();

        let listed = page.edges.iter().map(|e| e.node.id).collect::<Vec<_>>();
        assert_eq!(listed, made);
    }

    #[tokio::test]
    async fn lists_latest_contributions_backward() {
        let (svc, _) = fixture::service();
        let pool = fixture::pool(&svc, 1_000).await;
        let mut made = Vec::new();
        for amount in [10, 20, 30] {
            let res = fixture::contribute(&svc, pool.id, amount).await.unwrap();
            made.push(res.contribution.id);
        }

        let page = svc
            .execute(List::by(selector(
                pool.id,
                read::contribution::list::Arguments::new(
                    None,
                    None,
                    Some(2),
                    None,
                    10,
                )
                .unwrap(),
            )))
            .await
            .unwrap();

        let listed = page.edges.iter().map(|e| e.node.id).collect::<Vec<_>>();
        assert_eq!(listed, [made[2], made[1]]);
        assert!(page.page_info().has_previous_page);
    }
}
