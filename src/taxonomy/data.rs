//! Built-in interest taxonomy seed
//!
//! A coarse, curated topic forest plus a starter domain mapping. Hosts
//! may replace both via [`super::TaxonomySource`] JSON; the seed keeps
//! local runs and tests self-contained. Sensitive verticals (health,
//! politics, religion, dating, debt) are flagged here and excluded from
//! assignment and sharing downstream.

use crate::types::{Topic, TopicId};

fn topic(
    id: u32,
    parent: Option<u32>,
    level: u32,
    name: &str,
    sensitive: bool,
    description: &str,
) -> Topic {
    Topic {
        id: TopicId(id),
        name: name.to_string(),
        level,
        parent_id: parent.map(TopicId),
        is_sensitive: sensitive,
        description: description.to_string(),
    }
}

/// The built-in topic forest
pub fn seed_topics() -> Vec<Topic> {
    vec![
        // Arts & Entertainment
        topic(100, None, 1, "Arts & Entertainment", false, "Film, television, music, and the performing arts"),
        topic(110, Some(100), 2, "Movies", false, "Feature films, streaming catalogs, and cinema"),
        topic(111, Some(100), 2, "Television", false, "Series, episodic streaming, and broadcast TV"),
        topic(112, Some(100), 2, "Comics & Animation", false, "Comics, manga, and animated features"),
        topic(113, Some(100), 2, "Performing Arts", false, "Theater, dance, and live performance"),
        topic(120, Some(100), 2, "Music & Audio", false, "Recorded music, radio, and audio streaming"),
        topic(121, Some(120), 3, "Rock Music", false, "Rock and alternative genres"),
        topic(122, Some(120), 3, "Pop Music", false, "Pop and chart music"),
        topic(123, Some(120), 3, "Classical Music", false, "Orchestral, chamber, and opera"),
        topic(124, Some(120), 3, "Podcasts", false, "Spoken-word audio shows"),
        // Autos & Vehicles
        topic(200, None, 1, "Autos & Vehicles", false, "Cars, motorcycles, and vehicle ownership"),
        topic(210, Some(200), 2, "Electric Vehicles", false, "EVs, charging, and electric mobility"),
        topic(211, Some(200), 2, "Motorcycles", false, "Motorcycles and riding gear"),
        // Business
        topic(300, None, 1, "Business & Industrial", false, "Companies, industry, and professional services"),
        topic(310, Some(300), 2, "Advertising & Marketing", false, "Ad tech, brands, and campaigns"),
        topic(311, Some(300), 2, "Small Business", false, "Running and growing small companies"),
        // Finance
        topic(400, None, 1, "Finance", false, "Money management and financial services"),
        topic(410, Some(400), 2, "Banking", false, "Accounts, cards, and retail banking"),
        topic(411, Some(400), 2, "Investing", false, "Markets, brokers, and portfolios"),
        topic(412, Some(411), 3, "Cryptocurrency", false, "Digital assets and exchanges"),
        topic(413, Some(400), 2, "Insurance", false, "Policies and coverage"),
        topic(420, Some(400), 2, "Debt & Bankruptcy", true, "Debt collection, arrears, and insolvency"),
        // Food & Drink
        topic(500, None, 1, "Food & Drink", false, "Cooking, dining, and beverages"),
        topic(510, Some(500), 2, "Cooking & Recipes", false, "Home cooking and recipe collections"),
        topic(511, Some(500), 2, "Restaurants", false, "Dining out and reservations"),
        // Games
        topic(600, None, 1, "Games", false, "Video games and tabletop play"),
        topic(610, Some(600), 2, "Video Games", false, "PC, console, and streaming games"),
        topic(611, Some(610), 3, "Console Games", false, "Console platforms and titles"),
        topic(612, Some(610), 3, "Mobile Games", false, "Phone and tablet games"),
        topic(620, Some(600), 2, "Board Games", false, "Tabletop and card games"),
        // Health (entire vertical sensitive)
        topic(700, None, 1, "Health", true, "Medical topics and personal wellbeing"),
        topic(710, Some(700), 2, "Medical Conditions", true, "Diseases, symptoms, and treatment"),
        topic(711, Some(700), 2, "Mental Health", true, "Therapy and mental wellbeing"),
        topic(712, Some(700), 2, "Fitness", false, "Exercise and training"),
        // News
        topic(800, None, 1, "News", false, "Journalism and current events"),
        topic(810, Some(800), 2, "World News", false, "International coverage"),
        topic(811, Some(800), 2, "Local News", false, "Regional and city coverage"),
        topic(812, Some(800), 2, "Politics", true, "Parties, elections, and political affiliation"),
        // Shopping
        topic(900, None, 1, "Shopping", false, "Retail and online marketplaces"),
        topic(910, Some(900), 2, "Apparel", false, "Clothing and footwear"),
        topic(911, Some(900), 2, "Consumer Electronics", false, "Devices and gadgets"),
        // Sports
        topic(1000, None, 1, "Sports", false, "Following and playing sports"),
        topic(1010, Some(1000), 2, "Team Sports", false, "League and club sports"),
        topic(1011, Some(1010), 3, "Basketball", false, "Professional and college basketball"),
        topic(1012, Some(1010), 3, "Soccer", false, "Club and international football"),
        topic(1020, Some(1000), 2, "Individual Sports", false, "Solo competition and training"),
        topic(1021, Some(1020), 3, "Running", false, "Road running and trail racing"),
        topic(1022, Some(1020), 3, "Golf", false, "Courses, clubs, and tours"),
        // Technology
        topic(1100, None, 1, "Technology & Computing", false, "Hardware, software, and the internet"),
        topic(1110, Some(1100), 2, "Programming", false, "Software development and tooling"),
        topic(1111, Some(1100), 2, "Artificial Intelligence", false, "Machine learning and AI products"),
        topic(1112, Some(1100), 2, "Cybersecurity", false, "Security news and practice"),
        // Travel
        topic(1200, None, 1, "Travel & Transportation", false, "Trips, transit, and places"),
        topic(1210, Some(1200), 2, "Air Travel", false, "Flights and airlines"),
        topic(1211, Some(1200), 2, "Hotels & Accommodation", false, "Stays and booking"),
        topic(1212, Some(1200), 2, "Destinations", false, "Guides and itineraries"),
        // Education & Careers
        topic(1300, None, 1, "Education & Careers", false, "Learning and work life"),
        topic(1310, Some(1300), 2, "Job Search", false, "Openings, resumes, and hiring"),
        topic(1311, Some(1300), 2, "Online Courses", false, "Remote learning platforms"),
        // Sensitive standalone verticals
        topic(1400, None, 1, "Religion & Spirituality", true, "Faith, practice, and belief"),
        topic(1500, None, 1, "Dating & Relationships", true, "Dating services and relationships"),
    ]
}

/// The built-in domain → topic mapping
///
/// Domains are stored lower-case; a domain may map to several topics.
pub fn seed_domains() -> Vec<(&'static str, Vec<u32>)> {
    vec![
        ("netflix.com", vec![110, 111]),
        ("hulu.com", vec![111, 110]),
        ("imdb.com", vec![110]),
        ("youtube.com", vec![100, 120]),
        ("spotify.com", vec![120]),
        ("bandcamp.com", vec![120]),
        ("pitchfork.com", vec![120, 122]),
        ("last.fm", vec![120]),
        ("broadwayworld.com", vec![113]),
        ("webtoons.com", vec![112]),
        ("tesla.com", vec![210]),
        ("caranddriver.com", vec![200]),
        ("cycleworld.com", vec![211]),
        ("linkedin.com", vec![1310, 300]),
        ("hbr.org", vec![300]),
        ("adweek.com", vec![310]),
        ("bloomberg.com", vec![400, 411]),
        ("chase.com", vec![410]),
        ("robinhood.com", vec![411]),
        ("coinbase.com", vec![412]),
        ("lemonade.com", vec![413]),
        ("annualcreditreport.com", vec![420]),
        ("allrecipes.com", vec![510]),
        ("seriouseats.com", vec![510]),
        ("yelp.com", vec![511]),
        ("opentable.com", vec![511]),
        ("steampowered.com", vec![610]),
        ("ign.com", vec![610]),
        ("twitch.tv", vec![610]),
        ("playstation.com", vec![611]),
        ("boardgamegeek.com", vec![620]),
        ("webmd.com", vec![700, 710]),
        ("mayoclinic.org", vec![710]),
        ("betterhelp.com", vec![711]),
        ("strava.com", vec![712, 1021]),
        ("cnn.com", vec![800, 810]),
        ("bbc.com", vec![800, 810]),
        ("reuters.com", vec![810]),
        ("patch.com", vec![811]),
        ("politico.com", vec![812]),
        ("amazon.com", vec![900]),
        ("ebay.com", vec![900]),
        ("zappos.com", vec![910]),
        ("bestbuy.com", vec![911]),
        ("nike.com", vec![910, 1000]),
        ("espn.com", vec![1000]),
        ("nba.com", vec![1011]),
        ("fifa.com", vec![1012]),
        ("golfdigest.com", vec![1022]),
        ("github.com", vec![1110]),
        ("stackoverflow.com", vec![1110]),
        ("arstechnica.com", vec![1100]),
        ("wired.com", vec![1100, 1111]),
        ("huggingface.co", vec![1111]),
        ("krebsonsecurity.com", vec![1112]),
        ("expedia.com", vec![1200, 1210]),
        ("kayak.com", vec![1210]),
        ("booking.com", vec![1211]),
        ("airbnb.com", vec![1211]),
        ("tripadvisor.com", vec![1200, 1212]),
        ("lonelyplanet.com", vec![1212]),
        ("indeed.com", vec![1310]),
        ("coursera.org", vec![1311]),
        ("udemy.com", vec![1311]),
        ("biblegateway.com", vec![1400]),
        ("match.com", vec![1500]),
        ("tinder.com", vec![1500]),
    ]
}
