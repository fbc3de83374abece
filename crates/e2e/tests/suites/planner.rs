//! UI tests for planner.html (route planner between towns).
//!
//! Covers region selection, autocomplete dropdowns, search results, and
//! state restoration from the URL.

use std::time::Duration;

use ctan_e2e::driver::Page;
use ctan_e2e::fixtures::{MALAGA_ID, NUCLEO_ALHAURIN, NUCLEO_COIN};
use ctan_e2e::poll::{ensure, wait_until};
use ctan_e2e::suite::{Case, CaseFuture, Suite, SuiteKind};
use ctan_e2e::HarnessResult;

pub fn suite() -> Suite {
    Suite {
        name: "planner",
        kind: SuiteKind::LocalUi,
        default: true,
        cases: vec![
            Case::ui_network("nine_regions_shown", nine_regions_shown),
            Case::ui_network("select_region_shows_form", select_region_shows_form),
            Case::ui_network("search_disabled_until_both_selected", search_disabled_until_both_selected),
            Case::ui_network("coin_to_alhaurin_search", coin_to_alhaurin_search),
            Case::ui_network("dropdown_attached_to_input", dropdown_attached_to_input),
            Case::ui_network("state_restored_from_url", state_restored_from_url),
            Case::ui_network("result_card_navigates_to_route", result_card_navigates_to_route),
        ],
    }
}

/// Open the planner and select the Área de Málaga region.
async fn load_malaga(page: &Page) -> HarnessResult<()> {
    page.goto("/planner.html").await?;
    page.wait_visible("#planner-region-list .card").await?;
    page.click_containing("#planner-region-list .card", "Málaga")
        .await?;
    page.wait_visible("#from-input").await
}

fn nine_regions_shown(page: &Page) -> CaseFuture<'_> {
    Box::pin(async move {
        page.goto("/planner.html").await?;
        page.wait_visible("#planner-region-list .card").await?;
        let count = page.count("#planner-region-list .card").await?;
        ensure(count == 9, format!("expected 9 region cards, got {count}"))
    })
}

fn select_region_shows_form(page: &Page) -> CaseFuture<'_> {
    Box::pin(async move {
        load_malaga(page).await?;
        page.wait_visible("#to-input").await
    })
}

fn search_disabled_until_both_selected(page: &Page) -> CaseFuture<'_> {
    Box::pin(async move {
        load_malaga(page).await?;
        let disabled = page.attribute("#search-btn", "disabled").await?;
        ensure(
            disabled.is_some(),
            "search button should be disabled before both cores are chosen",
        )
    })
}

fn coin_to_alhaurin_search(page: &Page) -> CaseFuture<'_> {
    Box::pin(async move {
        load_malaga(page).await?;

        // From: Coín
        page.fill("#from-input", "Coin").await?;
        page.wait_visible("#from-results .planner-dropdown-item").await?;
        page.click_containing("#from-results .planner-dropdown-item", "Coín")
            .await?;

        // To: Alhaurín el Grande
        page.fill("#to-input", "Alhaurin el Grande").await?;
        page.wait_visible("#to-results .planner-dropdown-item").await?;
        page.click("#to-results .planner-dropdown-item").await?;

        // Search button unlocks once both ends are chosen.
        page.wait_function(
            "() => document.getElementById('search-btn').disabled === false",
            15_000,
        )
        .await?;
        page.click("#search-btn").await?;

        page.wait_function(
            "() => !document.getElementById('step-results').classList.contains('hidden')",
            20_000,
        )
        .await?;
        page.wait_function(
            "() => document.getElementById('results-list').querySelector('.loading-spinner') === null",
            20_000,
        )
        .await?;
        let results = page.count("#results-list .card").await?;
        ensure(results >= 1, format!("expected >=1 result card, got {results}"))
    })
}

/// The dropdown must sit flush against its input field.
fn dropdown_attached_to_input(page: &Page) -> CaseFuture<'_> {
    Box::pin(async move {
        load_malaga(page).await?;
        page.fill("#from-input", "Mal").await?;
        page.wait_visible("#from-results .planner-dropdown-item").await?;

        let input = page
            .bounding_box("#from-input")
            .await?
            .ok_or_else(|| ctan_e2e::HarnessError::Assertion("input has no box".into()))?;
        let dropdown = page
            .bounding_box("#from-results")
            .await?
            .ok_or_else(|| ctan_e2e::HarnessError::Assertion("dropdown has no box".into()))?;

        let gap = (dropdown.y - (input.y + input.height)).abs();
        ensure(
            gap <= 2.0,
            format!("gap between input and dropdown is {gap:.1}px"),
        )
    })
}

/// planner.html?c=4&fromN=201&toN=83 should jump straight to results.
fn state_restored_from_url(page: &Page) -> CaseFuture<'_> {
    Box::pin(async move {
        page.goto(&format!(
            "/planner.html?c={MALAGA_ID}&fromN={NUCLEO_COIN}&toN={NUCLEO_ALHAURIN}"
        ))
        .await?;
        page.wait_state(
            ".departure-card, .planner-result-card, #results-list .card",
            ctan_e2e::driver::WaitState::Visible,
            30_000,
        )
        .await?;

        let timeout = Duration::from_secs(5);
        wait_until(timeout, Duration::from_millis(200), || async move {
            Ok(page.count("#results-list .card").await? >= 1)
        })
        .await?
        .require("at least one planner result card", timeout)
    })
}

/// Tapping a result card opens the route detail page.
fn result_card_navigates_to_route(page: &Page) -> CaseFuture<'_> {
    Box::pin(async move {
        page.goto(&format!(
            "/planner.html?c={MALAGA_ID}&fromN={NUCLEO_COIN}&toN={NUCLEO_ALHAURIN}"
        ))
        .await?;
        page.wait_state(
            "#results-list .card",
            ctan_e2e::driver::WaitState::Visible,
            30_000,
        )
        .await?;
        page.click("#results-list .card").await?;
        page.wait_url("**/route.html**").await?;
        let url = page.url().await?;
        ensure(url.contains("c=4"), format!("url should carry c=4: {url}"))?;
        ensure(url.contains("l="), format!("url should carry a line id: {url}"))
    })
}
