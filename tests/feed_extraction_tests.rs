/// Feed extraction tests against fixture markup mirroring the rendered
/// newsfeed.
use katalog::feed::extract_feed;
use katalog::models::FeedAction;

const BASE_URL: &str = "https://www.goodreads.com";

fn page(items: &str) -> String {
    format!(r#"<html><body><div class="feed">{}</div></body></html>"#, items)
}

const RATED_ITEM: &str = r#"
<div class="gr-newsfeedItem">
  <div class="gr-newsfeedItem__header">
    <a class="gr-user__profileLink" href="https://www.goodreads.com/user/show/12345-jane-doe">Jane Doe</a>
    rated a book
    <small class="gr-newsfeedItem__headerTimestamp">
      <time datetime="2024-05-01T10:00:00-07:00">May 1, 2024</time>
    </small>
  </div>
  <div class="communityRating__stars" style="width: 80%"></div>
  <a class="gr-book__titleLink" href="/book/show/44767458-dune">Dune</a>
  <a class="gr-book__authorLink" href="/author/show/58.Frank_Herbert">Frank Herbert</a>
  <div class="gr-book__description">Set on the desert planet Arrakis. Continue reading</div>
</div>
"#;

#[test]
fn rated_item_extracts_all_fields() {
    let activities = extract_feed(&page(RATED_ITEM), BASE_URL, 50);
    assert_eq!(activities.len(), 1);

    let activity = &activities[0];
    assert_eq!(activity.user_name.as_deref(), Some("Jane Doe"));
    assert_eq!(
        activity.user_url.as_deref(),
        Some("https://www.goodreads.com/user/show/12345-jane-doe")
    );
    assert_eq!(activity.action, Some(FeedAction::Rated));
    // 80% star bar -> 4 of 5
    assert_eq!(activity.rating, Some(4));
    assert_eq!(activity.book_title.as_deref(), Some("Dune"));
    assert_eq!(
        activity.book_url.as_deref(),
        Some("https://www.goodreads.com/book/show/44767458-dune")
    );
    assert_eq!(activity.author.as_deref(), Some("Frank Herbert"));
    assert_eq!(activity.timestamp.as_deref(), Some("2024-05-01T10:00:00-07:00"));
    assert_eq!(activity.time_ago.as_deref(), Some("May 1, 2024"));
    assert_eq!(
        activity.book_description.as_deref(),
        Some("Set on the desert planet Arrakis.")
    );
}

#[test]
fn verb_phrase_link_label_falls_back_to_url_slug() {
    let item = r#"
<div class="gr-newsfeedItem">
  <div class="gr-newsfeedItem__header">
    <a class="gr-user__profileLink" href="/user/show/777-john-smith">is currently reading</a>
  </div>
  <a class="gr-book__titleLink" href="/book/show/1">Hyperion</a>
</div>
"#;
    let activities = extract_feed(&page(item), BASE_URL, 50);
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].user_name.as_deref(), Some("John Smith"));
    assert_eq!(activities[0].action, Some(FeedAction::CurrentlyReading));
}

#[test]
fn verb_phrase_link_without_slug_becomes_unknown() {
    let item = r#"
<div class="gr-newsfeedItem">
  <div class="gr-newsfeedItem__header">
    <a class="gr-user__profileLink" href="/user/show/777">finished reading</a>
  </div>
  <a class="gr-book__titleLink" href="/book/show/1">Hyperion</a>
</div>
"#;
    let activities = extract_feed(&page(item), BASE_URL, 50);
    assert_eq!(activities[0].user_name.as_deref(), Some("Unknown"));
    assert_eq!(activities[0].action, Some(FeedAction::Read));
}

#[test]
fn adversarial_header_resolves_by_documented_precedence() {
    // Header contains both "started reading" and "finished reading";
    // classification must deterministically pick the earlier rule.
    let item = r#"
<div class="gr-newsfeedItem">
  <div class="gr-newsfeedItem__header">
    <a class="gr-user__profileLink" href="/user/show/1-carol">Carol</a>
    started reading a book everyone else finished reading last year
  </div>
  <a class="gr-book__titleLink" href="/book/show/1">Hyperion</a>
</div>
"#;
    for _ in 0..3 {
        let activities = extract_feed(&page(item), BASE_URL, 50);
        assert_eq!(activities[0].action, Some(FeedAction::StartedReading));
    }
}

#[test]
fn entries_with_neither_actor_nor_book_are_noise() {
    let item = r#"
<div class="gr-newsfeedItem">
  <div class="gr-newsfeedItem__header">Sponsored recommendation</div>
</div>
"#;
    let activities = extract_feed(&page(item), BASE_URL, 50);
    assert!(activities.is_empty());
}

#[test]
fn timestamp_falls_back_to_element_attr_then_text() {
    let attr_item = r#"
<div class="gr-newsfeedItem">
  <div class="gr-newsfeedItem__header">
    <a class="gr-user__profileLink" href="/user/show/1-a">A</a> reviewed a book
    <small class="gr-newsfeedItem__headerTimestamp" datetime="2024-04-01T08:00:00+00:00">3 weeks ago</small>
  </div>
</div>
"#;
    let activities = extract_feed(&page(attr_item), BASE_URL, 50);
    assert_eq!(activities[0].timestamp.as_deref(), Some("2024-04-01T08:00:00+00:00"));
    assert_eq!(activities[0].time_ago.as_deref(), Some("3 weeks ago"));

    let text_item = r#"
<div class="gr-newsfeedItem">
  <div class="gr-newsfeedItem__header">
    <a class="gr-user__profileLink" href="/user/show/1-b">B</a> reviewed a book
    <small class="gr-newsfeedItem__headerTimestamp">2 days ago</small>
  </div>
</div>
"#;
    let activities = extract_feed(&page(text_item), BASE_URL, 50);
    assert_eq!(activities[0].timestamp, None);
    assert_eq!(activities[0].time_ago.as_deref(), Some("2 days ago"));
}

#[test]
fn rating_only_derived_for_rated_actions() {
    // A star bar may linger in the markup of other entry kinds; only the
    // rated action reads it.
    let item = r#"
<div class="gr-newsfeedItem">
  <div class="gr-newsfeedItem__header">
    <a class="gr-user__profileLink" href="/user/show/1-a">A</a> wants to read a book
  </div>
  <div class="communityRating__stars" style="width: 100%"></div>
  <a class="gr-book__titleLink" href="/book/show/1">Hyperion</a>
</div>
"#;
    let activities = extract_feed(&page(item), BASE_URL, 50);
    assert_eq!(activities[0].action, Some(FeedAction::WantsToRead));
    assert_eq!(activities[0].rating, None);
}

#[test]
fn extraction_caps_at_the_entry_limit() {
    let items: String = (0..55)
        .map(|i| {
            format!(
                r#"<div class="gr-newsfeedItem">
                     <div class="gr-newsfeedItem__header">
                       <a class="gr-user__profileLink" href="/user/show/{i}-user-{i}">User {i}</a>
                       wants to read a book
                     </div>
                     <a class="gr-book__titleLink" href="/book/show/{i}">Book {i}</a>
                   </div>"#
            )
        })
        .collect();
    let activities = extract_feed(&page(&items), BASE_URL, 50);
    assert_eq!(activities.len(), 50);
    assert_eq!(activities[0].user_name.as_deref(), Some("User 0"));
    assert_eq!(activities[49].user_name.as_deref(), Some("User 49"));
}

#[test]
fn empty_feed_markup_yields_no_activities() {
    let activities = extract_feed("<html><body></body></html>", BASE_URL, 50);
    assert!(activities.is_empty());
}
