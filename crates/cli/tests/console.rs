//! End-to-end tests driving the cluster through console lines.

use cli::{Cluster, Config, ConsoleError, Outcome};
use common::ReplicaId;

async fn run(cluster: &Cluster, line: &str) -> String {
    match cluster.run_line(line).await {
        Ok(Outcome::Continue(output)) => output,
        Ok(Outcome::Exit) => panic!("{line:?} exited the console"),
        Err(error) => panic!("{line:?} failed: {error}"),
    }
}

fn branch_lines(output: &str) -> Vec<&str> {
    output.lines().filter(|l| l.trim_start().starts_with('[')).collect()
}

mod scenario {
    use super::*;

    #[tokio::test]
    async fn apple_and_pear_resolved_from_console() {
        let cluster = Cluster::new(&Config::default());

        run(&cluster, "A create O1").await;
        run(&cluster, "sync").await;
        run(&cluster, "A add O1 apple").await;
        run(&cluster, "B add O1 pear").await;
        run(&cluster, "sync").await;

        let state = run(&cluster, "B state O1").await;
        assert!(state.contains("has 2 conflicting versions"), "{state}");

        // Both replicas list the branches in the same order.
        let at_a = run(&cluster, "A state O1").await;
        assert_eq!(branch_lines(&at_a), branch_lines(&state));

        let apple = branch_lines(&at_a)
            .iter()
            .position(|line| line.contains("items=apple "))
            .unwrap();

        // A is the lowest contributing replica, so only A may resolve.
        let denied = cluster
            .run_line(&format!("B resolve O1 {apple}"))
            .await
            .unwrap_err();
        assert!(matches!(denied, ConsoleError::Replica(_)), "{denied}");

        run(&cluster, &format!("A resolve O1 {apple}")).await;
        run(&cluster, "sync").await;

        for replica in ["A", "B"] {
            let state = run(&cluster, &format!("{replica} state O1")).await;
            let lines = branch_lines(&state);
            assert_eq!(lines.len(), 1, "{state}");
            assert!(lines[0].contains("items=apple "), "{state}");
        }

        run(&cluster, "B add O1 plum").await;
        run(&cluster, "sync").await;
        let state = run(&cluster, "A state O1").await;
        assert!(state.contains("items=apple,plum "), "{state}");
    }

    #[tokio::test]
    async fn update_count_includes_discarded_branch() {
        let cluster = Cluster::new(&Config::default());

        run(&cluster, "A create O1").await;
        run(&cluster, "sync").await;
        run(&cluster, "A add O1 apple").await;
        run(&cluster, "B add O1 pear").await;
        run(&cluster, "sync").await;

        assert_eq!(
            run(&cluster, "A count O1").await,
            "A: O1 received 2 updates"
        );
        assert_eq!(
            run(&cluster, "B count O1").await,
            "B: O1 received 2 updates"
        );
    }

    #[tokio::test]
    async fn one_way_sync_only_copies_into_target() {
        let cluster = Cluster::new(&Config::default());

        run(&cluster, "A create O1").await;
        assert_eq!(run(&cluster, "sync A B").await, "A -> B: 1 events");

        assert!(run(&cluster, "B state O1").await.starts_with("B: O1\n"));
        assert_eq!(run(&cluster, "sync B A").await, "B -> A: 0 events");
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn update_of_missing_order_reports_error() {
        let cluster = Cluster::new(&Config::default());

        let error = cluster.run_line("A add O9 apple").await.unwrap_err();
        assert!(matches!(error, ConsoleError::Replica(_)));
    }

    #[tokio::test]
    async fn update_while_conflicted_is_rejected() {
        let cluster = Cluster::new(&Config::default());

        run(&cluster, "A create O1").await;
        run(&cluster, "sync").await;
        run(&cluster, "A cancel O1").await;
        run(&cluster, "B add O1 pear").await;
        run(&cluster, "sync").await;

        let error = cluster.run_line("A add O1 apple").await.unwrap_err();
        assert!(matches!(error, ConsoleError::Replica(_)), "{error}");
    }

    #[tokio::test]
    async fn unknown_replica_and_bad_syntax() {
        let cluster = Cluster::new(&Config::default());

        assert!(matches!(
            cluster.run_line("C create O1").await,
            Err(ConsoleError::UnknownReplica(id)) if id == ReplicaId::new("C")
        ));
        assert!(matches!(
            cluster.run_line("sync A C").await,
            Err(ConsoleError::UnknownReplica(_))
        ));
        assert!(matches!(
            cluster.run_line("A create").await,
            Err(ConsoleError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn strict_removal_rejects_missing_item() {
        let config = Config {
            strict_item_removal: true,
            ..Config::default()
        };
        let cluster = Cluster::new(&config);

        run(&cluster, "A create O1").await;
        let error = cluster.run_line("A remove O1 apple").await.unwrap_err();
        assert!(matches!(error, ConsoleError::Replica(_)));
    }
}

mod snapshots {
    use super::*;

    #[tokio::test]
    async fn snapshot_then_list_all_orders() {
        let cluster = Cluster::new(&Config::default());

        run(&cluster, "A create O1").await;
        run(&cluster, "A add O1 apple").await;
        run(&cluster, "B create O2").await;
        run(&cluster, "sync").await;

        assert_eq!(
            run(&cluster, "A snapshot O1").await,
            "A: snapshot of O1 at sequence 2"
        );

        let all = run(&cluster, "A state").await;
        assert!(all.contains("A: O1\n"), "{all}");
        assert!(all.contains("[O2] items= cancelled=false by B"), "{all}");
    }
}
