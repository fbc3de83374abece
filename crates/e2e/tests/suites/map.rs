//! UI tests for map.html (Leaflet stop map with a region overlay).

use ctan_e2e::driver::Page;
use ctan_e2e::poll::{ensure, ensure_contains};
use ctan_e2e::suite::{Case, CaseFuture, Suite, SuiteKind};
use ctan_e2e::HarnessResult;

pub fn suite() -> Suite {
    Suite {
        name: "map",
        kind: SuiteKind::LocalUi,
        default: true,
        cases: vec![
            Case::ui_network("region_overlay_shown_on_first_load", region_overlay_shown_on_first_load),
            Case::ui_network("nine_regions_in_overlay", nine_regions_in_overlay),
            Case::ui_network("select_region_hides_overlay", select_region_hides_overlay),
            Case::ui_network("map_has_visible_dimensions", map_has_visible_dimensions),
            Case::ui_network("stop_markers_appear", stop_markers_appear),
            Case::ui_network("popup_shows_on_marker_click", popup_shows_on_marker_click),
            Case::ui_network("popup_button_text_is_white", popup_button_text_is_white),
            Case::ui_network("popup_departures_link", popup_departures_link),
            Case::ui_network("region_pill_shows_selected_name", region_pill_shows_selected_name),
            Case::ui_network("region_pill_reopens_overlay", region_pill_reopens_overlay),
        ],
    }
}

/// Open the map, pick Málaga from the overlay, and wait for markers.
async fn open_malaga_map(page: &Page) -> HarnessResult<()> {
    page.goto("/map.html").await?;
    page.wait_visible(".map-overlay-item").await?;
    page.click_containing(".map-overlay-item", "Málaga").await?;
    page.wait_state(
        ".map-stop-dot",
        ctan_e2e::driver::WaitState::Visible,
        20_000,
    )
    .await
}

fn region_overlay_shown_on_first_load(page: &Page) -> CaseFuture<'_> {
    Box::pin(async move {
        page.goto("/map.html").await?;
        page.wait_visible("#region-overlay").await?;
        let map_shown = page.is_visible("#map-container").await?;
        ensure(
            !map_shown,
            "the map container should stay hidden until a region is chosen",
        )
    })
}

fn nine_regions_in_overlay(page: &Page) -> CaseFuture<'_> {
    Box::pin(async move {
        page.goto("/map.html").await?;
        page.wait_visible(".map-overlay-item").await?;
        let count = page.count(".map-overlay-item").await?;
        ensure(count == 9, format!("expected 9 overlay items, got {count}"))
    })
}

fn select_region_hides_overlay(page: &Page) -> CaseFuture<'_> {
    Box::pin(async move {
        open_malaga_map(page).await?;
        let overlay = page.is_visible("#region-overlay").await?;
        ensure(!overlay, "overlay should hide after choosing a region")
    })
}

/// Guards against the classic Leaflet zero-height container bug.
fn map_has_visible_dimensions(page: &Page) -> CaseFuture<'_> {
    Box::pin(async move {
        open_malaga_map(page).await?;
        let bbox = page
            .bounding_box("#leaflet-map")
            .await?
            .ok_or_else(|| ctan_e2e::HarnessError::Assertion("map has no box".into()))?;
        ensure(
            bbox.width > 100.0 && bbox.height > 100.0,
            format!("map is {:.0}x{:.0}px", bbox.width, bbox.height),
        )
    })
}

fn stop_markers_appear(page: &Page) -> CaseFuture<'_> {
    Box::pin(async move {
        open_malaga_map(page).await?;
        let dots = page.count(".map-stop-dot").await?;
        ensure(dots > 50, format!("expected >50 stop markers, got {dots}"))
    })
}

fn popup_shows_on_marker_click(page: &Page) -> CaseFuture<'_> {
    Box::pin(async move {
        open_malaga_map(page).await?;
        page.click(".map-stop-dot").await?;
        page.wait_visible(".map-popup").await
    })
}

/// Regression test for the unreadable white-on-white popup button.
fn popup_button_text_is_white(page: &Page) -> CaseFuture<'_> {
    Box::pin(async move {
        open_malaga_map(page).await?;
        page.click(".map-stop-dot").await?;
        page.wait_visible(".map-popup-btn").await?;
        let color = page.computed_style(".map-popup-btn", "color").await?;
        ensure(
            color == "rgb(255, 255, 255)",
            format!("popup button text should be white, got {color:?}"),
        )
    })
}

fn popup_departures_link(page: &Page) -> CaseFuture<'_> {
    Box::pin(async move {
        open_malaga_map(page).await?;
        page.click(".map-stop-dot").await?;
        page.wait_visible(".map-popup-btn").await?;
        let href = page
            .attribute(".map-popup-btn", "href")
            .await?
            .unwrap_or_default();
        ensure_contains(&href, "station.html")?;
        ensure(
            href.contains("from=map.html"),
            format!("popup link should carry from=map.html: {href:?}"),
        )
    })
}

fn region_pill_shows_selected_name(page: &Page) -> CaseFuture<'_> {
    Box::pin(async move {
        open_malaga_map(page).await?;
        page.wait_visible("#region-pill-name").await?;
        ensure_contains(&page.text_content("#region-pill-name").await?, "Málaga")
    })
}

fn region_pill_reopens_overlay(page: &Page) -> CaseFuture<'_> {
    Box::pin(async move {
        open_malaga_map(page).await?;
        page.click("#region-btn").await?;
        page.wait_visible("#region-overlay").await
    })
}
