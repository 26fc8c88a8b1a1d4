//! ブレークポイントサイトの管理

use std::collections::HashMap;

use sumire_core::{BreakpointCondition, DebugThread, EvaluationGateway};

use crate::Result;

/// サイトの識別子
pub type SiteId = usize;

/// アドレスに張られたブレークポイントサイト
#[derive(Debug, Clone)]
pub struct BreakpointSite {
    id: SiteId,
    address: u64,
    condition: Option<BreakpointCondition>,
    hit_count: u64,
}

impl BreakpointSite {
    fn new(id: SiteId, address: u64) -> Self {
        Self {
            id,
            address,
            condition: None,
            hit_count: 0,
        }
    }

    pub fn id(&self) -> SiteId {
        self.id
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn condition(&self) -> Option<&BreakpointCondition> {
        self.condition.as_ref()
    }

    /// このサイトで停止した回数
    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }
}

/// ブレークポイントサイトの一覧と採番を管理する表
pub struct SiteTable {
    sites: HashMap<SiteId, BreakpointSite>,
    next_id: SiteId,
}

impl SiteTable {
    pub fn new() -> Self {
        Self {
            sites: HashMap::new(),
            next_id: 1,
        }
    }

    /// サイトを追加してIDを返す
    pub fn add(&mut self, address: u64) -> SiteId {
        let id = self.next_id;
        self.next_id += 1;
        self.sites.insert(id, BreakpointSite::new(id, address));
        id
    }

    pub fn remove(&mut self, id: SiteId) -> Result<()> {
        self.sites
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| anyhow::anyhow!("no breakpoint site with id {}", id))
    }

    pub fn get(&self, id: SiteId) -> Option<&BreakpointSite> {
        self.sites.get(&id)
    }

    /// ID順に並べたサイトの一覧
    pub fn sites(&self) -> Vec<&BreakpointSite> {
        let mut sites: Vec<&BreakpointSite> = self.sites.values().collect();
        sites.sort_by_key(|site| site.id);
        sites
    }

    /// 条件を設定する。既存の条件は丸ごと置き換えられる
    pub fn set_condition(&mut self, id: SiteId, condition: BreakpointCondition) -> Result<()> {
        self.site_mut(id)?.condition = Some(condition);
        Ok(())
    }

    /// 条件を外して無条件で停止するサイトに戻す
    pub fn clear_condition(&mut self, id: SiteId) -> Result<()> {
        self.site_mut(id)?.condition = None;
        Ok(())
    }

    /// サイト到達時の停止判定
    ///
    /// 条件のないサイトは常に停止します。停止した場合のみヒット数を数えます。
    pub fn notify_hit(
        &mut self,
        id: SiteId,
        gateway: &EvaluationGateway,
        thread: &dyn DebugThread,
    ) -> Result<bool> {
        let site = self.site_mut(id)?;
        let stop = match &site.condition {
            Some(condition) => condition.should_stop(gateway, thread),
            None => true,
        };
        if stop {
            site.hit_count += 1;
        }
        Ok(stop)
    }

    fn site_mut(&mut self, id: SiteId) -> Result<&mut BreakpointSite> {
        self.sites
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("no breakpoint site with id {}", id))
    }
}

impl Default for SiteTable {
    fn default() -> Self {
        Self::new()
    }
}
