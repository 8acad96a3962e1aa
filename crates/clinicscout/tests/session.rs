use clinicscout::filter::{ColumnInput, FilterConfig};
use clinicscout::scraper::StopReason;
use clinicscout::session::SessionError;
use clinicscout::types::{ListingKind, PageLimit, Region, Service};
use clinicscout::{NAME_COLUMN, Session, WebScraper};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service_page(cards: &[(&str, &str)]) -> String {
    let cards: String = cards
        .iter()
        .map(|(name, phone)| {
            format!(
                r#"<div class="b-card__row">
  <span data-qa="lpu_card_heading_lpu_name">{name}</span>
  <span data-qa="lpu_card_btn_addr_text">ул. Ленина, д. 1</span>
  <span data-qa="lpu_card_btn_phone_text">{phone}</span>
</div>"#
            )
        })
        .collect();
    format!("<html><body>{cards}</body></html>")
}

async fn mount_first_page(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap().len()
}

#[tokio::test]
async fn test_listing_scrape_is_memoised() {
    let server = MockServer::start().await;
    mount_first_page(
        &server,
        "/voronezh/lpu/",
        service_page(&[("Клиника 1", "1"), ("Клиника 2", "2")]),
    )
    .await;

    let mut session = Session::with_root(WebScraper::new().unwrap(), server.uri());
    let limit = PageLimit::pages(1).unwrap();

    let first = session
        .search_listing(Region::Voronezh, ListingKind::Clinics, limit)
        .await
        .unwrap();
    assert_eq!(first.dataset.len(), 2);
    assert_eq!(first.report.stop, StopReason::PageLimit { limit: 1 });
    assert_eq!(request_count(&server).await, 1);

    let second = session
        .search_listing(Region::Voronezh, ListingKind::Clinics, limit)
        .await
        .unwrap();
    assert_eq!(second, first);
    assert_eq!(request_count(&server).await, 1);
    assert_eq!(session.cached_scrapes(), 1);
    assert_eq!(session.last_result(), Some(&first.dataset));

    // A different page limit is a different query.
    session
        .search_listing(Region::Voronezh, ListingKind::Clinics, PageLimit::Unbounded)
        .await
        .unwrap();
    assert_eq!(session.cached_scrapes(), 2);
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn test_service_search_joins_and_filters() {
    let server = MockServer::start().await;
    mount_first_page(
        &server,
        "/sochi/diagnostika/mrt/",
        service_page(&[("X", "+7 1"), ("Y", "+7 2")]),
    )
    .await;
    mount_first_page(
        &server,
        "/sochi/diagnostika/kt/",
        service_page(&[("Y", "+7 3"), ("Z", "+7 4")]),
    )
    .await;

    let mut session = Session::with_root(WebScraper::new().unwrap(), server.uri());
    let search = session
        .search_services(Region::Sochi, &[Service::Mri, Service::Ct])
        .await
        .unwrap();

    assert_eq!(search.dataset.len(), 1);
    assert_eq!(
        search.dataset.column_values(NAME_COLUMN).unwrap().collect::<Vec<_>>(),
        vec![Some("Y")]
    );
    assert_eq!(
        search.dataset.column_values("Телефон").unwrap().collect::<Vec<_>>(),
        vec![Some("+7 2")]
    );
    assert_eq!(search.dataset.columns().len(), 5);
    assert_eq!(search.reports.len(), 2);
    assert_eq!(search.to_string(), "Found 1 clinic(s) in Сочи offering МРТ, КТ");

    // Page 1 of each service, then a 404 for page 2.
    let fetched = request_count(&server).await;
    assert_eq!(fetched, 4);

    let mri_only = session
        .search_services(Region::Sochi, &[Service::Mri])
        .await
        .unwrap();
    assert_eq!(mri_only.dataset.len(), 2);
    assert_eq!(request_count(&server).await, fetched);
    assert_eq!(session.last_result(), Some(&mri_only.dataset));

    let filtered = session
        .filter_last_result(
            &["Название=Y".parse::<ColumnInput>().unwrap()],
            &FilterConfig::default(),
        )
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(session.last_result().map(|d| d.len()), Some(2));
}

#[tokio::test]
async fn test_failed_scrape_leaves_session_untouched() {
    let server = MockServer::start().await;
    mount_first_page(&server, "/sochi/lpu/", service_page(&[("A", "1")])).await;
    mount_first_page(
        &server,
        "/sochi/diagnostika/rentgen/",
        r#"<span class="b-pagination-vuetify-imitation__item b-pagination-vuetify-imitation__item_current">первая</span>"#
            .to_string(),
    )
    .await;

    let mut session = Session::with_root(WebScraper::new().unwrap(), server.uri());
    let listing = session
        .search_listing(Region::Sochi, ListingKind::Clinics, PageLimit::Unbounded)
        .await
        .unwrap();

    let result = session
        .search_services(Region::Sochi, &[Service::Xray])
        .await;

    assert!(matches!(result, Err(SessionError::Scraper(_))));
    assert_eq!(session.cached_scrapes(), 1);
    assert_eq!(session.last_result(), Some(&listing.dataset));
}
