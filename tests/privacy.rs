//! Post Visibility Tests
//!
//! Exercises the privacy evaluator against in-memory relationship graphs.
//! No database is needed.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use sunglasses::app::privacy::{PrivacyEvaluator, RelationshipOracle};
use sunglasses::domain::post::{Post, PostType};
use sunglasses::domain::privacy::{PrivacySettings, PrivacyType};
use sunglasses::domain::user::UserRef;

const LOOKUP_TIMEOUT: Duration = Duration::from_millis(200);

const ALL_TYPES: [PrivacyType; 10] = [
    PrivacyType::Public,
    PrivacyType::None,
    PrivacyType::FollowersOnly,
    PrivacyType::FollowingOnly,
    PrivacyType::AllBut,
    PrivacyType::NoneBut,
    PrivacyType::FollowersBut,
    PrivacyType::FollowingBut,
    PrivacyType::Unset,
    PrivacyType::Unknown(42),
];

// ---------------------------------------------------------------------------
// Oracles
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Graph {
    edges: HashSet<(Uuid, Uuid)>,
    calls: AtomicUsize,
}

impl Graph {
    fn with_edge(follower: Uuid, followee: Uuid) -> Arc<Self> {
        let mut graph = Graph::default();
        graph.edges.insert((follower, followee));
        Arc::new(graph)
    }

    fn empty() -> Arc<Self> {
        Arc::new(Graph::default())
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelationshipOracle for Graph {
    async fn follows(&self, follower_id: Uuid, followee_id: Uuid) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.edges.contains(&(follower_id, followee_id)))
    }
}

struct FailingOracle;

#[async_trait]
impl RelationshipOracle for FailingOracle {
    async fn follows(&self, _follower_id: Uuid, _followee_id: Uuid) -> anyhow::Result<bool> {
        Err(anyhow!("relationship store unavailable"))
    }
}

struct StalledOracle;

#[async_trait]
impl RelationshipOracle for StalledOracle {
    async fn follows(&self, _follower_id: Uuid, _followee_id: Uuid) -> anyhow::Result<bool> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn post(author: Uuid, privacy_type: PrivacyType, users: Vec<Uuid>) -> Post {
    Post {
        id: Uuid::new_v4(),
        user_id: author,
        created_at: OffsetDateTime::now_utc(),
        post_type: PostType::Status,
        likes: 0,
        comments_num: 0,
        reported: 0,
        privacy: PrivacySettings {
            privacy_type,
            users,
        },
        text: Some("hello".into()),
        video_service: None,
        video_id: None,
        title: None,
        media_id: None,
        photo_url: None,
        thumbnail: None,
        caption: None,
        link_url: None,
        liked: false,
    }
}

fn evaluator<O: RelationshipOracle>(oracle: O) -> PrivacyEvaluator<O> {
    PrivacyEvaluator::new(oracle, LOOKUP_TIMEOUT)
}

// ===========================================================================
// Author access
// ===========================================================================

#[tokio::test]
async fn author_always_sees_own_post() {
    let author = Uuid::new_v4();
    let graph = Graph::empty();
    let evaluator = evaluator(graph.clone());
    let viewer = UserRef::new(author);

    for privacy_type in ALL_TYPES {
        let empty = post(author, privacy_type, vec![]);
        assert!(
            evaluator.can_access(&empty, &viewer).await,
            "author denied for {:?} with empty list",
            privacy_type
        );

        let listed = post(author, privacy_type, vec![author]);
        assert!(
            evaluator.can_access(&listed, &viewer).await,
            "author denied for {:?} when listed",
            privacy_type
        );
    }

    // The author shortcut never consults the graph
    assert_eq!(graph.calls(), 0);
}

// ===========================================================================
// Relationship-free modes
// ===========================================================================

#[tokio::test]
async fn public_visible_to_everyone() {
    let author = Uuid::new_v4();
    let evaluator = evaluator(Graph::empty());
    let post = post(author, PrivacyType::Public, vec![]);

    for _ in 0..5 {
        let viewer = UserRef::new(Uuid::new_v4());
        assert!(evaluator.can_access(&post, &viewer).await);
    }
}

#[tokio::test]
async fn none_hidden_from_everyone_but_author() {
    let author = Uuid::new_v4();
    let follower = Uuid::new_v4();
    let evaluator = evaluator(Graph::with_edge(follower, author));
    let post = post(author, PrivacyType::None, vec![follower]);

    assert!(!evaluator.can_access(&post, &UserRef::new(follower)).await);
    assert!(!evaluator.can_access(&post, &UserRef::new(Uuid::new_v4())).await);
}

#[tokio::test]
async fn all_but_excludes_listed_users() {
    let author = Uuid::new_v4();
    let excluded = Uuid::new_v4();
    let evaluator = evaluator(Graph::empty());
    let post = post(author, PrivacyType::AllBut, vec![excluded]);

    assert!(!evaluator.can_access(&post, &UserRef::new(excluded)).await);
    assert!(evaluator.can_access(&post, &UserRef::new(Uuid::new_v4())).await);
}

#[tokio::test]
async fn none_but_only_listed_users() {
    let author = Uuid::new_v4();
    let allowed = Uuid::new_v4();
    let evaluator = evaluator(Graph::empty());
    let post = post(author, PrivacyType::NoneBut, vec![allowed]);

    assert!(evaluator.can_access(&post, &UserRef::new(allowed)).await);
    assert!(!evaluator.can_access(&post, &UserRef::new(Uuid::new_v4())).await);
}

#[tokio::test]
async fn user_list_ignored_outside_but_modes() {
    let author = Uuid::new_v4();
    let viewer = Uuid::new_v4();
    let evaluator = evaluator(Graph::empty());

    let public = post(author, PrivacyType::Public, vec![viewer]);
    assert!(evaluator.can_access(&public, &UserRef::new(viewer)).await);

    let none = post(author, PrivacyType::None, vec![viewer]);
    assert!(!evaluator.can_access(&none, &UserRef::new(viewer)).await);

    let followers = post(author, PrivacyType::FollowersOnly, vec![viewer]);
    assert!(!evaluator.can_access(&followers, &UserRef::new(viewer)).await);
}

#[tokio::test]
async fn invalid_privacy_types_fail_closed() {
    let author = Uuid::new_v4();
    let viewer = Uuid::new_v4();
    let graph = Graph::with_edge(viewer, author);
    let evaluator = evaluator(graph.clone());

    for privacy_type in [PrivacyType::Unset, PrivacyType::Unknown(9), PrivacyType::Unknown(-1)] {
        let post = post(author, privacy_type, vec![viewer]);
        assert!(!evaluator.can_access(&post, &UserRef::new(viewer)).await);
    }
    assert_eq!(graph.calls(), 0);
}

// ===========================================================================
// Relationship modes
// ===========================================================================

#[tokio::test]
async fn followers_and_following_are_asymmetric() {
    let author = Uuid::new_v4();
    let viewer = Uuid::new_v4();
    let viewer_ref = UserRef::new(viewer);

    // Author follows viewer, viewer does not follow author
    let evaluator = evaluator(Graph::with_edge(author, viewer));
    let followers_only = post(author, PrivacyType::FollowersOnly, vec![]);
    let following_only = post(author, PrivacyType::FollowingOnly, vec![]);
    assert!(!evaluator.can_access(&followers_only, &viewer_ref).await);
    assert!(evaluator.can_access(&following_only, &viewer_ref).await);

    // Swap the direction
    let evaluator = self::evaluator(Graph::with_edge(viewer, author));
    assert!(evaluator.can_access(&followers_only, &viewer_ref).await);
    assert!(!evaluator.can_access(&following_only, &viewer_ref).await);
}

#[tokio::test]
async fn followers_but_denies_listed_follower() {
    let author = Uuid::new_v4();
    let listed = Uuid::new_v4();
    let other = Uuid::new_v4();

    let mut graph = Graph::default();
    graph.edges.insert((listed, author));
    graph.edges.insert((other, author));
    let evaluator = evaluator(Arc::new(graph));

    let post = post(author, PrivacyType::FollowersBut, vec![listed]);
    assert!(!evaluator.can_access(&post, &UserRef::new(listed)).await);
    assert!(evaluator.can_access(&post, &UserRef::new(other)).await);
    assert!(!evaluator.can_access(&post, &UserRef::new(Uuid::new_v4())).await);
}

#[tokio::test]
async fn following_but_denies_listed_followee() {
    let author = Uuid::new_v4();
    let listed = Uuid::new_v4();
    let other = Uuid::new_v4();

    let mut graph = Graph::default();
    graph.edges.insert((author, listed));
    graph.edges.insert((author, other));
    let evaluator = evaluator(Arc::new(graph));

    let post = post(author, PrivacyType::FollowingBut, vec![listed]);
    assert!(!evaluator.can_access(&post, &UserRef::new(listed)).await);
    assert!(evaluator.can_access(&post, &UserRef::new(other)).await);

    // Following the author is not enough for FollowingBut
    let fan = Uuid::new_v4();
    let evaluator = self::evaluator(Graph::with_edge(fan, author));
    assert!(!evaluator.can_access(&post, &UserRef::new(fan)).await);
}

#[tokio::test]
async fn at_most_one_lookup_per_evaluation() {
    let author = Uuid::new_v4();
    let viewer = UserRef::new(Uuid::new_v4());

    for privacy_type in ALL_TYPES {
        let graph = Graph::empty();
        let evaluator = evaluator(graph.clone());
        let post = post(author, privacy_type, vec![]);
        evaluator.can_access(&post, &viewer).await;
        assert!(graph.calls() <= 1, "{:?} made {} lookups", privacy_type, graph.calls());
    }
}

// ===========================================================================
// Oracle failures
// ===========================================================================

#[tokio::test]
async fn failing_oracle_denies_instead_of_erroring() {
    let author = Uuid::new_v4();
    let viewer = UserRef::new(Uuid::new_v4());
    let evaluator = evaluator(FailingOracle);

    for privacy_type in [
        PrivacyType::FollowersOnly,
        PrivacyType::FollowingOnly,
        PrivacyType::FollowersBut,
        PrivacyType::FollowingBut,
    ] {
        let post = post(author, privacy_type, vec![]);
        assert!(!evaluator.can_access(&post, &viewer).await);
    }

    // Modes that need no lookup are unaffected
    let public = post(author, PrivacyType::Public, vec![]);
    assert!(evaluator.can_access(&public, &viewer).await);
}

#[tokio::test]
async fn stalled_oracle_times_out_as_not_following() {
    let author = Uuid::new_v4();
    let viewer = UserRef::new(Uuid::new_v4());
    let evaluator = PrivacyEvaluator::new(StalledOracle, Duration::from_millis(20));

    let post = post(author, PrivacyType::FollowersOnly, vec![]);
    assert!(!evaluator.can_access(&post, &viewer).await);
}

// ===========================================================================
// Bulk filtering and anonymous viewers
// ===========================================================================

#[tokio::test]
async fn filter_visible_keeps_order() {
    let author = Uuid::new_v4();
    let viewer = Uuid::new_v4();
    let evaluator = evaluator(Graph::with_edge(viewer, author));

    let posts = vec![
        post(author, PrivacyType::Public, vec![]),
        post(author, PrivacyType::None, vec![]),
        post(author, PrivacyType::FollowersOnly, vec![]),
        post(author, PrivacyType::FollowingOnly, vec![]),
        post(author, PrivacyType::AllBut, vec![viewer]),
        post(author, PrivacyType::NoneBut, vec![viewer]),
    ];
    let expected = vec![posts[0].id, posts[2].id, posts[5].id];

    let visible = evaluator
        .filter_visible(posts, Some(&UserRef::new(viewer)))
        .await;
    let ids: Vec<Uuid> = visible.iter().map(|post| post.id).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn anonymous_viewers_only_see_public_posts() {
    let author = Uuid::new_v4();
    let graph = Graph::empty();
    let evaluator = evaluator(graph.clone());

    let posts: Vec<Post> = ALL_TYPES
        .iter()
        .map(|privacy_type| post(author, *privacy_type, vec![]))
        .collect();
    let public_id = posts[0].id;

    let visible = evaluator.filter_visible(posts, None).await;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, public_id);
    assert_eq!(graph.calls(), 0);
}
